//! Out-of-band kill instruction check.
//!
//! A fresh instruction warns; once it has been present for
//! `kill_instruction_time` it becomes fatal.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::{CheckKind, ThresholdRegistry, Verdict};
use crate::domain::ports::{KillInstruction, KillInstructionSource};

use super::{bounded, elapsed, human};

pub struct KillInstructionCheck {
    source: Arc<dyn KillInstructionSource>,
}

impl KillInstructionCheck {
    pub fn new(source: Arc<dyn KillInstructionSource>) -> Self {
        Self { source }
    }

    pub async fn evaluate(&self, registry: &ThresholdRegistry, now: DateTime<Utc>) -> Verdict {
        match bounded(registry.probe_timeout, self.source.instruction()).await {
            Ok(instruction) => classify(instruction.as_ref(), registry, now),
            Err(e) => {
                tracing::warn!(error = %e, "kill instruction probe failed");
                Verdict::probe_unavailable(CheckKind::KillInstructionFile).with_detail(e.to_string())
            }
        }
    }
}

pub fn classify(
    instruction: Option<&KillInstruction>,
    registry: &ThresholdRegistry,
    now: DateTime<Utc>,
) -> Verdict {
    let Some(instruction) = instruction else {
        return Verdict::ok(CheckKind::KillInstructionFile, "no_kill_instruction");
    };

    let age = elapsed(instruction.issued_at, now);
    let note = instruction
        .note
        .as_deref()
        .map(|n| format!(": {n}"))
        .unwrap_or_default();

    if age >= registry.kill_instruction_time {
        Verdict::fatal(CheckKind::KillInstructionFile, "kill_instruction")
            .with_detail(format!("kill instruction received {} ago{note}", human(age)))
    } else {
        Verdict::warn(CheckKind::KillInstructionFile, "kill_instruction_pending")
            .with_detail(format!("kill instruction received {} ago{note}", human(age)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use chrono::Duration as ChronoDuration;

    fn instruction(age_secs: i64, now: DateTime<Utc>) -> KillInstruction {
        KillInstruction {
            issued_at: now - ChronoDuration::seconds(age_secs),
            note: None,
        }
    }

    #[test]
    fn test_absent_is_ok() {
        let registry = ThresholdRegistry::reference();
        let verdict = classify(None, &registry, Utc::now());
        assert_eq!(verdict.severity, Severity::Ok);
    }

    #[test]
    fn test_fresh_instruction_warns() {
        let now = Utc::now();
        let registry = ThresholdRegistry::reference();
        let verdict = classify(Some(&instruction(5, now)), &registry, now);
        assert_eq!(verdict.severity, Severity::Warn);
    }

    #[test]
    fn test_aged_instruction_is_fatal() {
        let now = Utc::now();
        let registry = ThresholdRegistry::reference();
        let age = i64::try_from(registry.kill_instruction_time.as_secs()).unwrap();
        let verdict = classify(Some(&instruction(age, now)), &registry, now);
        assert_eq!(verdict.severity, Severity::Fatal);
        assert_eq!(verdict.reason, "kill_instruction");
    }
}
