//! Injected faults: the fleet routes around drones that stop reporting

use crate::test_utils::Scenario;
use emberwatch_core::{time_to_zone, Coordinate, Fault, Severity};
use emberwatch_drone::DroneState;
use emberwatch_scheduler::StallPolicy;
use emberwatch_transport::Message;
use tokio::time::Duration;

const SLACK: Duration = Duration::from_millis(10);

fn stall_policy(scenario: &mut Scenario) -> StallPolicy {
    let config = scenario.config_mut();
    StallPolicy::new(
        &config.scheduler,
        config.drone.drop_seconds_per_liter,
        config.simulation.time_scale,
    )
}

fn is_dispatch(message: &Message) -> bool {
    matches!(message, Message::DispatchOrder { .. })
}

#[tokio::test(start_paused = true)]
async fn test_stuck_drone_is_replaced_after_arrival_window() {
    let mut scenario = Scenario::two_zones(2).incident(1, Severity::Low, Fault::DroneStuckInFlight);
    let policy = stall_policy(&mut scenario);
    let fleet = scenario.start();
    let (first, second) = (fleet.drone_addr(1), fleet.drone_addr(2));
    let snapshots = fleet.snapshots.clone();
    let outcome = fleet.finish().await;

    assert_eq!(
        outcome.traffic.dispatches_to(first),
        vec![(1, Fault::DroneStuckInFlight)]
    );
    assert_eq!(
        outcome.traffic.dispatches_to(second).first(),
        Some(&(1, Fault::None))
    );
    assert_eq!(outcome.traffic.count_received(first, "arrived_notice"), 0);
    assert!(outcome
        .traffic
        .sent()
        .contains(&(first, Message::ReassignRequest { drone_id: 1 })));

    let dispatched = outcome.traffic.first_sent_at(first, is_dispatch).unwrap();
    let replaced = outcome.traffic.first_sent_at(second, is_dispatch).unwrap();
    let window = policy.arrival_timeout(time_to_zone(&Coordinate::BASE, &Coordinate::new(0.0, 300.0)));
    let waited = replaced - dispatched;
    assert!(waited >= window && waited <= window + SLACK, "{waited:?} vs {window:?}");

    assert_eq!(outcome.traffic.extinguished(), vec![1]);
    assert_eq!(
        outcome.drones[&1].state,
        DroneState::Faulted {
            fault: Fault::DroneStuckInFlight
        }
    );
    assert_eq!(outcome.drones[&2].state, DroneState::Idle);

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.drone(1).map(|d| d.unresponsive), Some(true));
    assert_eq!(snapshot.drone(2).map(|d| d.unresponsive), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_jammed_nozzle_is_replaced_after_drop_window() {
    let mut scenario = Scenario::two_zones(2).incident(1, Severity::Low, Fault::NozzleJammed);
    let policy = stall_policy(&mut scenario);
    let fleet = scenario.start();
    let (first, second) = (fleet.drone_addr(1), fleet.drone_addr(2));
    let outcome = fleet.finish().await;

    assert_eq!(outcome.traffic.count_received(first, "arrived_notice"), 1);
    assert_eq!(outcome.traffic.count_received(first, "drop_confirmation"), 0);

    let ordered = outcome
        .traffic
        .first_sent_at(first, |m| matches!(m, Message::DropOrder { .. }))
        .unwrap();
    let replaced = outcome.traffic.first_sent_at(second, is_dispatch).unwrap();
    let window = policy.drop_timeout(10.0);
    let waited = replaced - ordered;
    assert!(waited >= window && waited <= window + SLACK, "{waited:?} vs {window:?}");

    assert_eq!(
        outcome.drones[&1].state,
        DroneState::Faulted {
            fault: Fault::NozzleJammed
        }
    );
    // the jammed drone released nothing
    assert_eq!(outcome.drones[&1].water_level, 15.0);
    assert_eq!(outcome.traffic.count_received(second, "drop_confirmation"), 1);
    assert_eq!(outcome.traffic.extinguished(), vec![1]);
    assert!(outcome.scheduler.fires().all_clear());
}

#[tokio::test(start_paused = true)]
async fn test_lost_arrival_notice_triggers_probe_and_redispatch() {
    let mut scenario = Scenario::two_zones(1).incident(1, Severity::Low, Fault::PacketLoss);
    let policy = stall_policy(&mut scenario);
    let fleet = scenario.start();
    let drone = fleet.drone_addr(1);
    let outcome = fleet.finish().await;

    assert_eq!(
        outcome.traffic.dispatches_to(drone),
        vec![(1, Fault::PacketLoss), (1, Fault::None)]
    );
    // only the second trip's notice got through
    assert_eq!(outcome.traffic.count_received(drone, "arrived_notice"), 1);

    let dispatched = outcome.traffic.first_sent_at(drone, is_dispatch).unwrap();
    let probed = outcome
        .traffic
        .first_sent_at(drone, |m| matches!(m, Message::ReassignRequest { .. }))
        .unwrap();
    let window = policy.arrival_timeout(time_to_zone(&Coordinate::BASE, &Coordinate::new(0.0, 300.0)));
    let waited = probed - dispatched;
    assert!(waited >= window && waited <= window + SLACK, "{waited:?} vs {window:?}");

    assert_eq!(outcome.traffic.extinguished(), vec![1]);
    assert_eq!(outcome.drones[&1].state, DroneState::Idle);
    assert_eq!(outcome.drones[&1].position, Coordinate::BASE);
}

#[tokio::test(start_paused = true)]
async fn test_fault_applies_to_first_dispatch_only() {
    let fleet = Scenario::two_zones(1)
        .incident(1, Severity::High, Fault::PacketLoss)
        .start();
    let drone = fleet.drone_addr(1);
    let outcome = fleet.finish().await;

    let faults: Vec<Fault> = outcome
        .traffic
        .dispatches_to(drone)
        .into_iter()
        .map(|(_, fault)| fault)
        .collect();
    assert_eq!(faults.first(), Some(&Fault::PacketLoss));
    assert!(faults[1..].iter().all(|f| *f == Fault::None), "{faults:?}");
    assert_eq!(outcome.traffic.extinguished(), vec![1]);
}
