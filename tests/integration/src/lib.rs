//! Integration tests for the firefighting fleet
//!
//! This test suite validates, over the in-process network with paused time:
//! - Complete incident runs from feed to shutdown
//! - Recovery from stuck, jammed and lossy drones
//! - Termination when the network itself drops frames
//! - Shutdown drain and fleet snapshot publication

pub mod test_utils;

#[cfg(test)]
mod end_to_end_tests;

#[cfg(test)]
mod fault_recovery_tests;

#[cfg(test)]
mod lossy_network_tests;
