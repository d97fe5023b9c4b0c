//! Kill instruction port - out-of-band requests to stop the payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::ProbeError;

/// An instruction that has been dropped for the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillInstruction {
    /// When the instruction appeared
    pub issued_at: DateTime<Utc>,
    /// Free text carried by the instruction, if any
    pub note: Option<String>,
}

#[async_trait]
pub trait KillInstructionSource: Send + Sync {
    /// Current instruction, `None` when nothing has been requested.
    async fn instruction(&self) -> Result<Option<KillInstruction>, ProbeError>;
}
