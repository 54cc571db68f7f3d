//! Emberwatch Drone
//!
//! A firefighting drone: a pure state machine over its own mission data and a
//! worker that drives it from transport messages and internal timers.

#![warn(missing_docs)]

pub mod info;
pub mod machine;
pub mod state;
pub mod unit;

pub use info::{DroneInfo, DroneParams};
pub use machine::{transition, DroneEvent, Effect, Step, Timer};
pub use state::{DroneState, Mission};
pub use unit::DroneUnit;
