//! Complete runs from incident feed to fleet shutdown

use crate::test_utils::Scenario;
use emberwatch_core::{Coordinate, Fault, Severity, ZoneId};
use emberwatch_drone::DroneState;
use emberwatch_transport::Message;

#[tokio::test(start_paused = true)]
async fn test_single_drone_clears_two_zones_in_order() {
    let fleet = Scenario::two_zones(1)
        .incident(1, Severity::High, Fault::None)
        .incident(2, Severity::Moderate, Fault::None)
        .start();
    let drone = fleet.drone_addr(1);
    let outcome = fleet.finish().await;

    let zones: Vec<ZoneId> = outcome
        .traffic
        .dispatches_to(drone)
        .into_iter()
        .map(|(zone_id, _)| zone_id)
        .collect();
    assert_eq!(zones, vec![1, 1, 2, 2]);
    assert_eq!(outcome.traffic.extinguished(), vec![1, 2]);

    let released: Vec<f64> = outcome
        .traffic
        .received()
        .into_iter()
        .filter_map(|(_, message)| match message {
            Message::DropConfirmation { volume_liters, .. } => Some(volume_liters),
            _ => None,
        })
        .collect();
    assert_eq!(released, vec![15.0, 15.0, 15.0, 5.0]);

    assert!(outcome.scheduler.fires().all_clear());
    assert!(outcome.scheduler.is_finished());
    assert_eq!(outcome.report.zones_registered, 2);
    assert_eq!(outcome.report.incidents_reported, 2);
    assert_eq!(outcome.report.fires_extinguished, 2);
    assert!(outcome
        .traffic
        .sent()
        .contains(&(drone, Message::ShutdownOrder)));

    let info = &outcome.drones[&1];
    assert_eq!(info.state, DroneState::Idle);
    assert_eq!(info.position, Coordinate::BASE);
    assert!(info.flight_time_remaining > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_incidents_accumulate_demand() {
    let fleet = Scenario::two_zones(1)
        .incident(1, Severity::Low, Fault::None)
        .incident(1, Severity::Low, Fault::None)
        .start();
    let outcome = fleet.finish().await;

    let released: f64 = outcome
        .traffic
        .received()
        .into_iter()
        .filter_map(|(_, message)| match message {
            Message::DropConfirmation { volume_liters, .. } => Some(volume_liters),
            _ => None,
        })
        .sum();
    assert_eq!(released, 20.0);
    assert_eq!(outcome.traffic.extinguished(), vec![1]);
    assert_eq!(outcome.report.fires_extinguished, 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_drone_takes_the_next_fire() {
    let fleet = Scenario::two_zones(3)
        .zone(3, 650.0, 0.0, 650.0, 600.0)
        .incident(1, Severity::Low, Fault::None)
        .incident(2, Severity::Moderate, Fault::None)
        .incident(3, Severity::High, Fault::None)
        .start();
    let addrs: Vec<_> = (1..=3).map(|id| fleet.drone_addr(id)).collect();
    let outcome = fleet.finish().await;

    for (zone_id, addr) in (1..=3).zip(&addrs) {
        let first = outcome.traffic.dispatches_to(*addr).first().copied();
        assert_eq!(first, Some((zone_id, Fault::None)));
    }

    let mut extinguished = outcome.traffic.extinguished();
    extinguished.sort_unstable();
    assert_eq!(extinguished, vec![1, 2, 3]);
    assert_eq!(outcome.report.fires_extinguished, 3);

    for info in outcome.drones.values() {
        assert_eq!(info.state, DroneState::Idle);
        assert_eq!(info.position, Coordinate::BASE);
    }
}

#[tokio::test(start_paused = true)]
async fn test_final_snapshot_reflects_shutdown() {
    let fleet = Scenario::two_zones(2)
        .incident(2, Severity::Moderate, Fault::None)
        .start();
    let snapshots = fleet.snapshots.clone();
    let outcome = fleet.finish().await;

    let snapshot = snapshots.borrow().clone();
    assert!(snapshot.shutting_down);
    assert!(!snapshot.any_burning());
    assert_eq!(snapshot.extinguished, 1);
    assert_eq!(snapshot.zone(2).map(|z| z.outstanding_liters), Some(0.0));
    assert!(snapshot.drones.iter().all(|d| d.assigned_zone.is_none()));
    assert_eq!(outcome.drones.len(), 2);
}
