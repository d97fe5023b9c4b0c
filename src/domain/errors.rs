//! Domain errors for the pilot watchdog.

use std::time::Duration;

use thiserror::Error;

use super::models::job::LifecycleStatus;

/// A resource probe could not produce a sample.
///
/// Checks convert every probe error into a warn verdict; it never leaves
/// the check boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("process {0} is not visible to the probe")]
    ProcessNotFound(u32),

    #[error("probe unavailable: {0}")]
    Unavailable(String),
}

/// Delivering a signal to the payload failed.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to signal process group {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("payload has no process id")]
    NoProcess,
}

/// Launching the payload failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("payload command is empty")]
    EmptyCommand,

    #[error("input files total {total} bytes, above the {limit} byte maximum")]
    InputTooLarge { total: u64, limit: u64 },

    #[error("failed to spawn payload '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Domain-level errors raised by the lifecycle machinery.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: LifecycleStatus,
        to: LifecycleStatus,
    },

    #[error("payload {job_id} survived a forced kill after {grace:?}")]
    KillFailure { job_id: String, grace: Duration },

    #[error("Heartbeat delivery failed: {0}")]
    HeartbeatDelivery(String),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub type WatchdogResult<T> = Result<T, WatchdogError>;
