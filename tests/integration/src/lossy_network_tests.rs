//! Runs over a network that drops frames at random

use crate::test_utils::{Scenario, RUN_LIMIT};
use emberwatch_core::{Coordinate, Fault, Severity};
use emberwatch_drone::DroneState;
use tokio::time::Instant;

const LOSS: f64 = 0.2;

#[tokio::test(start_paused = true)]
async fn test_lossy_runs_terminate_with_every_fire_out() {
    for seed in 1..=10 {
        let started = Instant::now();
        let fleet = Scenario::two_zones(2)
            .incident(1, Severity::High, Fault::None)
            .incident(2, Severity::Moderate, Fault::None)
            .lossy(LOSS, seed)
            .start();
        let outcome = fleet.finish_allowing_stragglers().await;

        assert!(started.elapsed() < RUN_LIMIT, "seed {seed}");
        assert!(outcome.scheduler.is_finished(), "seed {seed}");
        assert!(outcome.scheduler.fires().all_clear(), "seed {seed}");
        assert_eq!(outcome.report.incidents_reported, 2, "seed {seed}");
        assert_eq!(outcome.report.fires_extinguished, 2, "seed {seed}");

        let mut extinguished = outcome.traffic.extinguished();
        extinguished.sort_unstable();
        assert_eq!(extinguished, vec![1, 2], "seed {seed}");

        for (id, info) in &outcome.drones {
            assert_eq!(info.state, DroneState::Idle, "seed {seed} drone {id}");
            assert_eq!(info.position, Coordinate::BASE, "seed {seed} drone {id}");
        }
        assert_eq!(
            outcome.drones.len() + outcome.stragglers.len(),
            2,
            "seed {seed}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_heavy_loss_single_drone_still_finishes() {
    let fleet = Scenario::two_zones(1)
        .incident(2, Severity::Low, Fault::None)
        .lossy(0.4, 11)
        .start();
    let outcome = fleet.finish_allowing_stragglers().await;

    assert!(outcome.scheduler.is_finished());
    assert!(outcome.scheduler.fires().all_clear());
    assert_eq!(outcome.report.fires_extinguished, 1);
}
