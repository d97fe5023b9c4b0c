//! Append-only job journal
//!
//! One JSON object per line, keyed by job id and timestamp. Holds the
//! measurement record and the error log of every monitored job.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::models::{ErrorKind, JobState, LifecycleStatus, PendingError, Verdict};

/// What happened to the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JournalEvent {
    Started {
        pid: Option<u32>,
        resource_class: String,
    },
    Measurement {
        disk_available: Option<u64>,
        memory_used: Option<u64>,
        cpu_used: Option<f32>,
        output_size: Option<u64>,
    },
    Warning {
        check: String,
        reason: String,
        detail: Option<String>,
    },
    StatusChanged {
        from: LifecycleStatus,
        to: LifecycleStatus,
    },
    Error {
        error_kind: ErrorKind,
        diagnostic: String,
    },
    Suspended {
        gap_secs: u64,
    },
    Finished {
        status: LifecycleStatus,
        exit_code: Option<i32>,
        pending_error: Option<PendingError>,
    },
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    #[serde(flatten)]
    pub event: JournalEvent,
}

impl JournalEntry {
    pub fn new(job_id: impl Into<String>, timestamp: DateTime<Utc>, event: JournalEvent) -> Self {
        Self {
            timestamp,
            job_id: job_id.into(),
            event,
        }
    }

    pub fn measurement(state: &JobState, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            state.id.clone(),
            timestamp,
            JournalEvent::Measurement {
                disk_available: state.disk_available,
                memory_used: state.current_memory_used,
                cpu_used: state.current_cpu_used,
                output_size: state.current_output_size,
            },
        )
    }

    pub fn warning(job_id: &str, verdict: &Verdict, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            job_id,
            timestamp,
            JournalEvent::Warning {
                check: verdict.check_name().to_string(),
                reason: verdict.reason.clone(),
                detail: verdict.detail.clone(),
            },
        )
    }

    pub fn finished(state: &JobState, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            state.id.clone(),
            timestamp,
            JournalEvent::Finished {
                status: state.lifecycle_status,
                exit_code: state.exit_code,
                pending_error: state.pending_error.clone(),
            },
        )
    }
}

/// Shared handle to the journal file
#[derive(Clone)]
pub struct JobJournal {
    file: Arc<Mutex<File>>,
}

impl JobJournal {
    /// Open `path` for appending, creating parent directories as needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create journal directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Append one entry
    pub fn record(&self, entry: &JournalEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("failed to serialize journal entry")?;

        {
            let mut file = self
                .file
                .lock()
                .map_err(|e| anyhow::anyhow!("journal mutex poisoned: {e}"))?;
            writeln!(file, "{json}").context("failed to write journal entry")?;
            file.flush().context("failed to flush journal")?;
        }

        debug!(job_id = %entry.job_id, "journal entry written");
        Ok(())
    }

    /// Read every entry back, oldest first
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
        let content = std::fs::read_to_string(path.as_ref()).context("failed to read journal")?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("malformed journal line"))
            .collect()
    }
}
