//! Flight model
//!
//! Empirically fitted travel-time curve and the battery feasibility check the
//! scheduler applies before every dispatch.

use crate::types::Coordinate;

/// Distance offset of the fitted travel curve (meters)
pub const TRAVEL_OFFSET_M: f64 = 46.875;

/// Cruise speed of the fitted travel curve (meters per second)
pub const CRUISE_SPEED_MPS: f64 = 15.0;

/// Fixed takeoff/landing overhead of the fitted travel curve (seconds)
pub const TRAVEL_OVERHEAD_S: f64 = 6.25;

/// Flight time a drone must still have left after a round trip (seconds)
pub const BATTERY_SAFETY_MARGIN_S: f64 = 30.0;

/// Travel time in seconds for a flight covering `distance` meters.
///
/// Negative results for degenerate short hops are clamped to zero.
pub fn travel_time_for_distance(distance: f64) -> f64 {
    ((distance - TRAVEL_OFFSET_M) / CRUISE_SPEED_MPS + TRAVEL_OVERHEAD_S).max(0.0)
}

/// Travel time in seconds from `from` to `to`.
pub fn time_to_zone(from: &Coordinate, to: &Coordinate) -> f64 {
    travel_time_for_distance(from.distance_to(to))
}

/// Travel time of the round trip `position -> target -> base`.
pub fn round_trip_time(position: &Coordinate, target: &Coordinate) -> f64 {
    let outbound = position.distance_to(target);
    let homebound = target.distance_to(&Coordinate::BASE);
    travel_time_for_distance(outbound + homebound)
}

/// Whether a drone at `position` with `flight_time_remaining` seconds can
/// fly to `target` and back to base keeping the safety margin.
pub fn has_enough_battery(
    position: &Coordinate,
    flight_time_remaining: f64,
    target: &Coordinate,
) -> bool {
    flight_time_remaining - round_trip_time(position, target) > BATTERY_SAFETY_MARGIN_S
}
