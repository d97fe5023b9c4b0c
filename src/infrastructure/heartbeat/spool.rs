//! Heartbeat delivery through a spool file picked up by the harvester.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::domain::errors::{WatchdogError, WatchdogResult};
use crate::domain::ports::{HeartbeatAck, HeartbeatMessage, HeartbeatSender};

use super::pilot_file::{HeartbeatStamp, PilotHeartbeatFile};

/// Writes each heartbeat as JSON to the spool file, replacing the previous
/// one. A completed write counts as acknowledged.
#[derive(Debug, Clone)]
pub struct SpoolHeartbeatSender {
    spool: PathBuf,
    pilot_file: Option<PilotHeartbeatFile>,
}

impl SpoolHeartbeatSender {
    pub fn new(spool: impl Into<PathBuf>) -> Self {
        Self {
            spool: spool.into(),
            pilot_file: None,
        }
    }

    /// Also stamp `last_server_update` in the pilot heartbeat file.
    pub fn with_pilot_file(mut self, pilot_file: PilotHeartbeatFile) -> Self {
        self.pilot_file = Some(pilot_file);
        self
    }
}

#[async_trait]
impl HeartbeatSender for SpoolHeartbeatSender {
    async fn send(&self, message: &HeartbeatMessage) -> WatchdogResult<HeartbeatAck> {
        let json = serde_json::to_vec_pretty(message)
            .map_err(|e| WatchdogError::HeartbeatDelivery(e.to_string()))?;

        let tmp = self.spool.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| WatchdogError::HeartbeatDelivery(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.spool)
            .await
            .map_err(|e| WatchdogError::HeartbeatDelivery(format!("{}: {e}", self.spool.display())))?;

        let acked_at = Utc::now();
        if let Some(pilot_file) = &self.pilot_file {
            pilot_file
                .stamp(HeartbeatStamp::Server, acked_at)
                .await
                .map_err(|e| WatchdogError::HeartbeatDelivery(format!("{e:#}")))?;
        }

        debug!(job_id = %message.job_id, status = %message.status, spool = %self.spool.display(), "heartbeat spooled");
        Ok(HeartbeatAck { acked_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LifecycleStatus;
    use tempfile::TempDir;

    fn message() -> HeartbeatMessage {
        HeartbeatMessage {
            job_id: "4711".to_string(),
            pilot_id: "pilot-1".to_string(),
            status: LifecycleStatus::Warning,
            pending_error: None,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_message_is_spooled_and_stamped() {
        let dir = TempDir::new().unwrap();
        let pilot_file = PilotHeartbeatFile::new(dir.path().join("pilot_heartbeat.json"));
        let sender = SpoolHeartbeatSender::new(dir.path().join("worker_heartbeat.json"))
            .with_pilot_file(pilot_file.clone());

        let ack = sender.send(&message()).await.unwrap();

        let spooled: HeartbeatMessage = serde_json::from_slice(
            &std::fs::read(dir.path().join("worker_heartbeat.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(spooled.status, LifecycleStatus::Warning);
        assert_eq!(
            pilot_file.read().await.last_server_update,
            ack.acked_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_unwritable_spool_fails_delivery() {
        let sender = SpoolHeartbeatSender::new("/nonexistent/dir/heartbeat.json");
        assert!(matches!(
            sender.send(&message()).await,
            Err(WatchdogError::HeartbeatDelivery(_))
        ));
    }
}
