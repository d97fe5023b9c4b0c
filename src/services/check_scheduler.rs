//! Cooperative, tick-driven check scheduler.
//!
//! Each check keeps its own due time derived from its interval. On every
//! tick the due checks are evaluated concurrently, each bounded by the probe
//! timeout, and their verdicts come back in declared check order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::trace;

use crate::domain::models::{CheckKind, JobState, ThresholdRegistry, Verdict};

use super::checks::Check;

/// A check plus its next due time.
struct ScheduledCheck {
    check: Check,
    interval: Duration,
    next_due: DateTime<Utc>,
}

pub struct CheckScheduler {
    checks: Vec<ScheduledCheck>,
}

impl CheckScheduler {
    /// Schedule `checks` with every check due at `start`.
    pub fn new(checks: Vec<Check>, registry: &ThresholdRegistry, start: DateTime<Utc>) -> Self {
        let mut checks: Vec<ScheduledCheck> = checks
            .into_iter()
            .map(|check| ScheduledCheck {
                interval: check.interval(registry),
                check,
                next_due: start,
            })
            .collect();
        checks.sort_by_key(|scheduled| scheduled.check.kind());

        Self { checks }
    }

    /// Kinds of the scheduled checks, in declared order.
    pub fn kinds(&self) -> Vec<CheckKind> {
        self.checks.iter().map(|s| s.check.kind()).collect()
    }

    /// Kinds of the checks due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<CheckKind> {
        self.checks
            .iter()
            .filter(|s| s.next_due <= now)
            .map(|s| s.check.kind())
            .collect()
    }

    /// Earliest upcoming due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.checks.iter().map(|s| s.next_due).min()
    }

    /// Evaluate every check due at `now` and reschedule them.
    ///
    /// Verdicts are returned in declared check order. An empty result means
    /// nothing was due.
    pub async fn run_due(
        &mut self,
        state: &JobState,
        registry: &ThresholdRegistry,
        now: DateTime<Utc>,
    ) -> Vec<Verdict> {
        let due: Vec<&mut ScheduledCheck> = self
            .checks
            .iter_mut()
            .filter(|s| s.next_due <= now)
            .collect();

        if due.is_empty() {
            return Vec::new();
        }

        trace!(job_id = %state.id, due = due.len(), "running due checks");

        let verdicts = join_all(
            due.iter()
                .map(|scheduled| scheduled.check.evaluate(state, registry, now)),
        )
        .await;

        for scheduled in due {
            // Intervals past the calendar's range mean the check never comes due again.
            scheduled.next_due = chrono::Duration::from_std(scheduled.interval)
                .ok()
                .and_then(|interval| now.checked_add_signed(interval))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }

        verdicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use crate::services::checks::LastHeartbeatCheck;

    #[tokio::test]
    async fn test_checks_start_due() {
        let registry = ThresholdRegistry::reference();
        let start = Utc::now();
        let mut scheduler = CheckScheduler::new(
            vec![Check::LastHeartbeat(LastHeartbeatCheck)],
            &registry,
            start,
        );
        let state = JobState::new("1", "MCORE", start);

        assert_eq!(scheduler.due(start), vec![CheckKind::LastHeartbeat]);
        let verdicts = scheduler.run_due(&state, &registry, start).await;
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].severity, Severity::Ok);
    }

    #[tokio::test]
    async fn test_check_not_rerun_before_interval() {
        let registry = ThresholdRegistry::reference();
        let start = Utc::now();
        let mut scheduler = CheckScheduler::new(
            vec![Check::LastHeartbeat(LastHeartbeatCheck)],
            &registry,
            start,
        );
        let state = JobState::new("1", "MCORE", start);

        scheduler.run_due(&state, &registry, start).await;

        let soon = start + chrono::Duration::seconds(1);
        assert!(scheduler.run_due(&state, &registry, soon).await.is_empty());

        let process = chrono::Duration::from_std(registry.check_intervals.process).unwrap();
        let later = start + process;
        assert_eq!(scheduler.run_due(&state, &registry, later).await.len(), 1);
        assert_eq!(scheduler.next_due(), Some(later + process));
    }

    #[tokio::test]
    async fn test_huge_interval_is_never_due_again() {
        let mut registry = ThresholdRegistry::reference();
        registry.check_intervals.process = Duration::from_secs(1_000_000_000_000_000);
        let start = Utc::now();
        let mut scheduler = CheckScheduler::new(
            vec![Check::LastHeartbeat(LastHeartbeatCheck)],
            &registry,
            start,
        );
        let state = JobState::new("1", "MCORE", start);

        assert_eq!(scheduler.run_due(&state, &registry, start).await.len(), 1);
        assert_eq!(scheduler.next_due(), Some(DateTime::<Utc>::MAX_UTC));

        let much_later = start + chrono::Duration::days(365 * 100);
        assert!(scheduler.run_due(&state, &registry, much_later).await.is_empty());
    }
}
