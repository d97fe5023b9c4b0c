//! Heartbeat sender port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::WatchdogResult;
use crate::domain::models::{LifecycleStatus, PendingError};

/// Status update for the central service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub job_id: String,
    pub pilot_id: String,
    pub status: LifecycleStatus,
    pub pending_error: Option<PendingError>,
    pub sent_at: DateTime<Utc>,
}

/// Acknowledgement of a delivered heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub acked_at: DateTime<Utc>,
}

/// Delivers heartbeats to the central service.
///
/// Termination decisions never depend on delivery succeeding, only on the
/// timestamps of attempted and acknowledged sends.
#[async_trait]
pub trait HeartbeatSender: Send + Sync {
    async fn send(&self, message: &HeartbeatMessage) -> WatchdogResult<HeartbeatAck>;
}
