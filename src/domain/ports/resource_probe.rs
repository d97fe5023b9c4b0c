//! Resource probe port - current disk, memory, CPU and output usage of a job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::ProbeError;

/// Newest modification and largest file among the payload's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputActivity {
    pub last_modified: Option<DateTime<Utc>>,
    pub largest_file: u64,
}

/// Filesystem usage of the job's working area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    /// Bytes still available to the job
    pub available: u64,
    /// Bytes the work directory currently occupies, when known
    pub used: Option<u64>,
}

/// Samples the working area and process tree of one job.
///
/// Implementations may block on I/O; callers bound every call with the
/// configured probe timeout.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn disk_usage(&self) -> Result<DiskUsage, ProbeError>;

    /// Resident memory of the payload process tree, in bytes.
    async fn memory_used(&self) -> Result<u64, ProbeError>;

    /// CPU usage of the payload process tree, in percent of one core.
    async fn cpu_used(&self) -> Result<f32, ProbeError>;

    async fn output_activity(&self) -> Result<OutputActivity, ProbeError>;
}
