//! Job state domain model.
//!
//! One [`JobState`] exists per monitored payload. It is created when the
//! payload starts and dropped once the job reaches a terminal status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::WatchdogError;

use super::verdict::Observation;

/// Lifecycle status of a monitored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Payload is running and every check is healthy
    Running,
    /// At least one check warned during the last evaluated tick
    Warning,
    /// Termination has been issued, waiting for the payload to exit
    Killing,
    /// Payload exited after being killed
    Terminated,
    /// Payload could not be killed
    Failed,
    /// Payload completed on its own
    Done,
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl LifecycleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Warning => "warning",
            Self::Killing => "killing",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }

    /// Check if this is a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed | Self::Done)
    }

    /// Running or Warning.
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Warning)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Running => vec![Self::Warning, Self::Killing, Self::Done],
            Self::Warning => vec![Self::Running, Self::Killing, Self::Done],
            Self::Killing => vec![Self::Terminated, Self::Failed],
            Self::Terminated | Self::Failed | Self::Done => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a termination cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProxyExpired,
    NoLocalSpace,
    LostHeartbeat,
    LoopingJob,
    MemoryExceeded,
    OutputTooLarge,
    KillInstruction,
    ExternalStop,
    KillFailure,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProxyExpired => "proxy_expired",
            Self::NoLocalSpace => "no_local_space",
            Self::LostHeartbeat => "lost_heartbeat",
            Self::LoopingJob => "looping_job",
            Self::MemoryExceeded => "memory_exceeded",
            Self::OutputTooLarge => "output_too_large",
            Self::KillInstruction => "kill_instruction",
            Self::ExternalStop => "external_stop",
            Self::KillFailure => "kill_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded termination cause: kind plus a human-readable diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingError {
    pub kind: ErrorKind,
    pub diagnostic: String,
}

impl PendingError {
    pub fn new(kind: ErrorKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }
}

impl fmt::Display for PendingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.diagnostic)
    }
}

/// Mutable record of one running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub resource_class: String,
    pub start_time: DateTime<Utc>,
    pub debug_mode: bool,

    pub last_heartbeat_sent_at: Option<DateTime<Utc>>,
    pub last_heartbeat_ack_at: Option<DateTime<Utc>>,
    pub last_payload_output_activity_at: Option<DateTime<Utc>>,

    pub current_disk_used: Option<u64>,
    pub disk_available: Option<u64>,
    pub current_memory_used: Option<u64>,
    /// Percent of one core, summed over the process tree.
    pub current_cpu_used: Option<f32>,
    pub current_output_size: Option<u64>,

    pub lifecycle_status: LifecycleStatus,
    pub pending_error: Option<PendingError>,
    pub exit_code: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(
        id: impl Into<String>,
        resource_class: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_class: resource_class.into(),
            start_time,
            debug_mode: false,
            last_heartbeat_sent_at: None,
            last_heartbeat_ack_at: None,
            last_payload_output_activity_at: None,
            current_disk_used: None,
            disk_available: None,
            current_memory_used: None,
            current_cpu_used: None,
            current_output_size: None,
            lifecycle_status: LifecycleStatus::Running,
            pending_error: None,
            exit_code: None,
            updated_at: start_time,
        }
    }

    pub const fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Reference point for heartbeat staleness.
    pub fn heartbeat_reference(&self) -> DateTime<Utc> {
        self.last_heartbeat_ack_at.unwrap_or(self.start_time)
    }

    /// Reference point for output inactivity, optionally refreshed by a newer probe sample.
    pub fn output_activity_reference(&self, probed: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let recorded = self
            .last_payload_output_activity_at
            .unwrap_or(self.start_time);
        probed.map_or(recorded, |p| p.max(recorded))
    }

    /// Fold a probe sample taken by a check into the job record.
    pub fn record_observation(&mut self, observation: &Observation, now: DateTime<Utc>) {
        match observation {
            Observation::Disk { available, used } => {
                self.disk_available = Some(*available);
                if used.is_some() {
                    self.current_disk_used = *used;
                }
            }
            Observation::MemoryUsed { bytes } => self.current_memory_used = Some(*bytes),
            Observation::CpuUsed { percent } => self.current_cpu_used = Some(*percent),
            Observation::OutputActivity {
                last_modified,
                largest_file,
            } => {
                if let Some(modified) = last_modified {
                    self.last_payload_output_activity_at =
                        Some(self.output_activity_reference(Some(*modified)));
                }
                self.current_output_size = Some(*largest_file);
            }
        }
        self.updated_at = now;
    }

    pub fn record_heartbeat_sent(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_sent_at = Some(at);
        self.updated_at = at;
    }

    /// Acknowledgements never move the reference backwards.
    pub fn record_heartbeat_ack(&mut self, at: DateTime<Utc>) {
        let acked = self.last_heartbeat_ack_at.map_or(at, |prev| prev.max(at));
        self.last_heartbeat_ack_at = Some(acked);
        self.updated_at = at;
    }

    pub fn can_transition_to(&self, new_status: LifecycleStatus) -> bool {
        self.lifecycle_status.can_transition_to(new_status)
    }

    /// Transition to new status.
    pub fn transition_to(
        &mut self,
        new_status: LifecycleStatus,
        now: DateTime<Utc>,
    ) -> Result<(), WatchdogError> {
        if !self.can_transition_to(new_status) {
            return Err(WatchdogError::InvalidStateTransition {
                from: self.lifecycle_status,
                to: new_status,
            });
        }

        self.lifecycle_status = new_status;
        self.updated_at = now;
        Ok(())
    }

    pub const fn is_terminal(&self) -> bool {
        self.lifecycle_status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn job() -> JobState {
        JobState::new("4711", "MCORE", Utc::now())
    }

    #[test]
    fn test_new_job_is_running() {
        let job = job();
        assert_eq!(job.lifecycle_status, LifecycleStatus::Running);
        assert!(job.pending_error.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_running_warning_oscillates() {
        let mut job = job();
        let now = Utc::now();
        job.transition_to(LifecycleStatus::Warning, now).unwrap();
        job.transition_to(LifecycleStatus::Running, now).unwrap();
        job.transition_to(LifecycleStatus::Warning, now).unwrap();
        assert_eq!(job.lifecycle_status, LifecycleStatus::Warning);
    }

    #[test]
    fn test_killing_is_one_way() {
        let mut job = job();
        let now = Utc::now();
        job.transition_to(LifecycleStatus::Killing, now).unwrap();

        for status in [
            LifecycleStatus::Running,
            LifecycleStatus::Warning,
            LifecycleStatus::Done,
            LifecycleStatus::Killing,
        ] {
            assert!(job.transition_to(status, now).is_err());
        }
        assert!(job.can_transition_to(LifecycleStatus::Terminated));
        assert!(job.can_transition_to(LifecycleStatus::Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [
            LifecycleStatus::Terminated,
            LifecycleStatus::Failed,
            LifecycleStatus::Done,
        ] {
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
    }

    #[test]
    fn test_heartbeat_reference_falls_back_to_start() {
        let mut job = job();
        assert_eq!(job.heartbeat_reference(), job.start_time);

        let ack = job.start_time + ChronoDuration::seconds(30);
        job.last_heartbeat_ack_at = Some(ack);
        assert_eq!(job.heartbeat_reference(), ack);
    }

    #[test]
    fn test_record_observation_updates_samples() {
        let mut job = job();
        let now = job.start_time + ChronoDuration::seconds(60);

        job.record_observation(
            &Observation::Disk {
                available: 1024,
                used: None,
            },
            now,
        );
        job.record_observation(&Observation::MemoryUsed { bytes: 2048 }, now);
        job.record_observation(
            &Observation::OutputActivity {
                last_modified: Some(now),
                largest_file: 42,
            },
            now,
        );

        assert_eq!(job.disk_available, Some(1024));
        assert_eq!(job.current_disk_used, None);
        assert_eq!(job.current_memory_used, Some(2048));
        assert_eq!(job.current_output_size, Some(42));
        assert_eq!(job.last_payload_output_activity_at, Some(now));
        assert_eq!(job.updated_at, now);
    }

    #[test]
    fn test_heartbeat_ack_never_regresses() {
        let mut job = job();
        let later = job.start_time + ChronoDuration::seconds(100);
        let earlier = job.start_time + ChronoDuration::seconds(10);

        job.record_heartbeat_ack(later);
        job.record_heartbeat_ack(earlier);
        assert_eq!(job.last_heartbeat_ack_at, Some(later));
    }

    #[test]
    fn test_output_activity_reference_takes_newest() {
        let mut job = job();
        let recorded = job.start_time + ChronoDuration::seconds(10);
        job.last_payload_output_activity_at = Some(recorded);

        let older = job.start_time + ChronoDuration::seconds(5);
        let newer = job.start_time + ChronoDuration::seconds(50);
        assert_eq!(job.output_activity_reference(Some(older)), recorded);
        assert_eq!(job.output_activity_reference(Some(newer)), newer);
        assert_eq!(job.output_activity_reference(None), recorded);
    }
}
