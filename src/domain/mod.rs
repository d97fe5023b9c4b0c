//! Domain layer for the pilot watchdog
//!
//! Job state, thresholds, verdicts and the ports the monitoring engine
//! talks to. Nothing in here performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ControlError, LaunchError, ProbeError, WatchdogError, WatchdogResult};
