//! Folds one tick's verdicts into a single lifecycle decision.
//!
//! Any fatal verdict terminates the job. When several checks go fatal in
//! the same tick, the one earliest in declared check order supplies the
//! recorded cause, so the outcome does not depend on which timer happened to
//! fire first.

use tracing::{debug, warn};

use crate::domain::models::{LifecycleDecision, PendingError, Severity, Verdict};

#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictAggregator;

impl VerdictAggregator {
    pub const fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, verdicts: &[Verdict]) -> LifecycleDecision {
        if verdicts.is_empty() {
            return LifecycleDecision::Idle;
        }

        // Checks without an error kind are informational and cannot terminate.
        let cause = verdicts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.severity == Severity::Fatal)
            .filter_map(|(index, v)| v.check.error_kind().map(|kind| (v.check, index, kind, v)))
            .min_by_key(|(check, index, _, _)| (*check, *index));

        if let Some((_, _, kind, fatal)) = cause {
            let fatal_checks: Vec<&str> = verdicts
                .iter()
                .filter(|v| v.is_fatal())
                .map(Verdict::check_name)
                .collect();
            warn!(
                cause = %fatal.check,
                reason = %fatal.reason,
                fatal_checks = ?fatal_checks,
                "fatal condition detected"
            );

            return LifecycleDecision::Terminate {
                cause: PendingError::new(kind, fatal.diagnostic()),
            };
        }

        let warnings: Vec<Verdict> = verdicts
            .iter()
            .filter(|v| v.severity == Severity::Warn)
            .cloned()
            .collect();

        if warnings.is_empty() {
            debug!(evaluated = verdicts.len(), "all checks healthy");
            LifecycleDecision::Continue
        } else {
            LifecycleDecision::ContinueWithWarning { warnings }
        }
    }
}
