//! Application layer
//!
//! - PilotAgent: launches payloads and owns one monitor per job
//! - JobMonitor: the per-job loop that serializes every state change
//! - HeartbeatReporter: periodic status delivery for one job

pub mod agent;
pub mod heartbeat_reporter;
pub mod job_monitor;

pub use agent::{
    HostProbeFactory, JobSpec, PilotAgent, ProbeFactory, default_heartbeat_spool,
};
pub use heartbeat_reporter::{HeartbeatEvent, HeartbeatReporter, ReportedStatus};
pub use job_monitor::JobMonitor;
