//! The pilot's own heartbeat file.
//!
//! A small JSON document `{"last_pilot_update": <epoch>, "last_server_update":
//! <epoch>}`. The monitor stamps `last_pilot_update` every tick; a large gap
//! since the previous stamp means the whole pilot was suspended.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Which timestamp to stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStamp {
    Pilot,
    Server,
}

/// File content; epochs in seconds, absent keys read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotHeartbeat {
    #[serde(default)]
    pub last_pilot_update: i64,
    #[serde(default)]
    pub last_server_update: i64,
}

impl PilotHeartbeat {
    pub fn last_pilot_update(&self) -> Option<DateTime<Utc>> {
        epoch(self.last_pilot_update)
    }

    pub fn last_server_update(&self) -> Option<DateTime<Utc>> {
        epoch(self.last_server_update)
    }

    /// Gap since the last pilot stamp when it exceeds `limit`.
    pub fn suspension(&self, limit: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_pilot_update()?;
        let gap = (now - last).to_std().ok()?;
        (gap > limit).then_some(gap)
    }
}

fn epoch(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Serialized read-modify-write access to the heartbeat file.
#[derive(Debug, Clone)]
pub struct PilotHeartbeatFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl PilotHeartbeatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content. A missing or unreadable file reads as empty.
    pub async fn read(&self) -> PilotHeartbeat {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Stamp `which` with `at` and return the content before the update.
    pub async fn stamp(&self, which: HeartbeatStamp, at: DateTime<Utc>) -> Result<PilotHeartbeat> {
        let _guard = self.lock.lock().await;
        let previous = self.read_unlocked().await;

        let mut next = previous;
        match which {
            HeartbeatStamp::Pilot => next.last_pilot_update = at.timestamp(),
            HeartbeatStamp::Server => next.last_server_update = at.timestamp(),
        }

        let json = serde_json::to_vec(&next).context("failed to serialize pilot heartbeat")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        Ok(previous)
    }

    async fn read_unlocked(&self) -> PilotHeartbeat {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "unreadable pilot heartbeat file");
                PilotHeartbeat::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => PilotHeartbeat::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read pilot heartbeat file");
                PilotHeartbeat::default()
            }
        }
    }
}
