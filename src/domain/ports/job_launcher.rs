//! Job launcher port - starts the payload and exposes control over it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::errors::{ControlError, LaunchError};

/// How the payload process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadExit {
    /// Exit code, `None` when the process was ended by a signal
    pub code: Option<i32>,
    pub exited_at: DateTime<Utc>,
}

/// Signals the running payload.
#[async_trait]
pub trait PayloadControl: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Ask the payload to stop (SIGTERM in the reference launcher).
    async fn terminate(&self) -> Result<(), ControlError>;

    /// Stop the payload unconditionally (SIGKILL in the reference launcher).
    async fn force_kill(&self) -> Result<(), ControlError>;
}

/// A started payload: its control handle plus an exit notification.
pub struct LaunchedPayload {
    pub control: Arc<dyn PayloadControl>,
    /// Holds `None` while the payload runs and `Some` once it exited.
    pub exit: watch::Receiver<Option<PayloadExit>>,
}

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadCommand {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: std::path::PathBuf,
}

#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(&self, command: &PayloadCommand) -> Result<LaunchedPayload, LaunchError>;
}
