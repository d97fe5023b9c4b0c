//! Verdicts and lifecycle decisions.
//!
//! A [`Verdict`] is the outcome of one check evaluation. Verdicts live for a
//! single scheduling tick: they are folded into one [`LifecycleDecision`] and
//! then discarded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{ErrorKind, PendingError};

/// Reason attached to any verdict whose probe failed or timed out.
pub const PROBE_UNAVAILABLE: &str = "probe_unavailable";

/// Identity of a check.
///
/// The derived ordering is the declared evaluation order; it decides which
/// fatal verdict supplies the recorded termination cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Proxy,
    FreeSpace,
    LastHeartbeat,
    Looping,
    MemoryUsage,
    OutputSize,
    CpuUsage,
    KillInstructionFile,
}

impl CheckKind {
    /// All checks, in declared order.
    pub const ALL: [Self; 8] = [
        Self::Proxy,
        Self::FreeSpace,
        Self::LastHeartbeat,
        Self::Looping,
        Self::MemoryUsage,
        Self::OutputSize,
        Self::CpuUsage,
        Self::KillInstructionFile,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::FreeSpace => "free_space",
            Self::LastHeartbeat => "last_heartbeat",
            Self::Looping => "looping",
            Self::MemoryUsage => "memory_usage",
            Self::OutputSize => "output_size",
            Self::CpuUsage => "cpu_usage",
            Self::KillInstructionFile => "kill_instruction_file",
        }
    }

    /// Termination cause recorded when this check goes fatal.
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Proxy => Some(ErrorKind::ProxyExpired),
            Self::FreeSpace => Some(ErrorKind::NoLocalSpace),
            Self::LastHeartbeat => Some(ErrorKind::LostHeartbeat),
            Self::Looping => Some(ErrorKind::LoopingJob),
            Self::MemoryUsage => Some(ErrorKind::MemoryExceeded),
            Self::OutputSize => Some(ErrorKind::OutputTooLarge),
            Self::CpuUsage => None,
            Self::KillInstructionFile => Some(ErrorKind::KillInstruction),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a verdict, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Fatal,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the check recommends doing about its finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    None,
    Notify,
    Terminate,
}

/// Sample a check took while evaluating, folded into the job state afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Observation {
    Disk { available: u64, used: Option<u64> },
    MemoryUsed { bytes: u64 },
    CpuUsed { percent: f32 },
    OutputActivity {
        last_modified: Option<DateTime<Utc>>,
        largest_file: u64,
    },
}

/// Outcome of one check evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub check: CheckKind,
    pub severity: Severity,
    pub reason: String,
    pub suggested_action: SuggestedAction,
    /// Human-readable explanation with the measured values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
}

impl Verdict {
    pub fn ok(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Ok,
            reason: reason.into(),
            suggested_action: SuggestedAction::None,
            detail: None,
            observation: None,
        }
    }

    pub fn warn(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Warn,
            reason: reason.into(),
            suggested_action: SuggestedAction::Notify,
            detail: None,
            observation: None,
        }
    }

    pub fn fatal(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Fatal,
            reason: reason.into(),
            suggested_action: SuggestedAction::Terminate,
            detail: None,
            observation: None,
        }
    }

    /// Warn verdict for a probe that failed or timed out.
    pub fn probe_unavailable(check: CheckKind) -> Self {
        Self::warn(check, PROBE_UNAVAILABLE)
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observation = Some(observation);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Detail when present, otherwise the reason.
    pub fn diagnostic(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.reason)
    }

    /// Name of the check that produced this verdict.
    pub const fn check_name(&self) -> &'static str {
        self.check.as_str()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Single decision derived from one tick's verdicts.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleDecision {
    /// No check was due this tick.
    Idle,
    /// Every evaluated check was healthy.
    Continue,
    /// At least one check warned, none was fatal.
    ContinueWithWarning { warnings: Vec<Verdict> },
    /// Terminate the payload with the recorded cause.
    Terminate { cause: PendingError },
}

impl LifecycleDecision {
    /// Decision for an operator or orchestrator stop request.
    pub fn external_stop(diagnostic: impl Into<String>) -> Self {
        Self::Terminate {
            cause: PendingError::new(ErrorKind::ExternalStop, diagnostic),
        }
    }

    pub const fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Continue => "continue",
            Self::ContinueWithWarning { .. } => "continue_with_warning",
            Self::Terminate { .. } => "terminate",
        }
    }
}
