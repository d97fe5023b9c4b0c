//! File-based kill instruction: a file dropped into the work directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::ProbeError;
use crate::domain::ports::{KillInstruction, KillInstructionSource};

/// Watches `<workdir>/<filename>`; its modification time is the issue time
/// and its content, if any, the note.
#[derive(Debug, Clone)]
pub struct KillFile {
    path: PathBuf,
}

impl KillFile {
    pub fn new(workdir: impl AsRef<Path>, filename: &str) -> Self {
        Self {
            path: workdir.as_ref().join(filename),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KillInstructionSource for KillFile {
    async fn instruction(&self) -> Result<Option<KillInstruction>, ProbeError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let issued_at = DateTime::<Utc>::from(metadata.modified()?);
        let note = tokio::fs::read_to_string(&self.path)
            .await
            .ok()
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());

        Ok(Some(KillInstruction { issued_at, note }))
    }
}
