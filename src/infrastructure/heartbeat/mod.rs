//! Heartbeat adapters
//!
//! - PilotHeartbeatFile: the pilot's own liveness stamps
//! - SpoolHeartbeatSender: status delivery through a harvester spool file

pub mod pilot_file;
pub mod spool;

pub use pilot_file::{HeartbeatStamp, PilotHeartbeat, PilotHeartbeatFile};
pub use spool::SpoolHeartbeatSender;
