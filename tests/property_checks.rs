//! Property tests for threshold normalization, check monotonicity and
//! aggregation determinism.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use proptest::prelude::*;

use common::{ExitOn, MockControl, registry};
use pilot_watchdog::domain::models::{
    CheckKind, ConfigValue, JobState, LifecycleDecision, LifecycleStatus, Severity, Verdict,
};
use pilot_watchdog::infrastructure::config::units;
use pilot_watchdog::services::checks::heartbeat;
use pilot_watchdog::services::{LifecycleController, VerdictAggregator};

fn verdict(kind_index: usize, severity: u8) -> Verdict {
    let kind = CheckKind::ALL[kind_index];
    match severity {
        0 => Verdict::ok(kind, "ok"),
        1 => Verdict::warn(kind, "warn"),
        _ => Verdict::fatal(kind, format!("{kind} fired")),
    }
}

fn verdicts_strategy() -> impl Strategy<Value = Vec<Verdict>> {
    prop::collection::vec((0..CheckKind::ALL.len(), 0u8..3), 1..16)
        .prop_map(|raw| raw.into_iter().map(|(k, s)| verdict(k, s)).collect())
}

proptest! {
    /// Property: normalized durations are never negative
    ///
    /// Negative inputs are rejected, everything else maps to whole seconds.
    #[test]
    fn prop_durations_never_negative(secs in any::<i64>()) {
        let result = units::duration("pilot.heartbeat", &ConfigValue::Integer(secs));
        if secs < 0 {
            prop_assert!(result.is_err());
        } else {
            prop_assert_eq!(result.unwrap(), Duration::from_secs(secs.unsigned_abs()));
        }
    }

    /// Property: megabyte sizes normalize to exact binary multiples
    #[test]
    fn prop_megabytes_are_binary(mb in 0u64..1_000_000) {
        let bytes = units::byte_size("pilot.free_space_limit", &ConfigValue::text(format!("{mb} MB")))
            .unwrap();
        prop_assert_eq!(bytes, mb * 1024 * 1024);
    }

    /// Property: once lost, a heartbeat stays lost as time moves on
    #[test]
    fn prop_lost_heartbeat_is_monotonic(
        silence in 0i64..100_000,
        later in 0i64..100_000,
    ) {
        let registry = registry();
        let now = Utc::now();
        let mut state = JobState::new("p", "SCORE", now - ChronoDuration::days(30));
        state.last_heartbeat_ack_at = Some(now - ChronoDuration::seconds(silence));

        let first = heartbeat::classify(&state, &registry, now);
        let second = heartbeat::classify(&state, &registry, now + ChronoDuration::seconds(later));

        if first.severity == Severity::Fatal {
            prop_assert_eq!(second.severity, Severity::Fatal);
        }
        let lost = Duration::from_secs(silence.unsigned_abs()) > registry.lost_heartbeat_timeout;
        prop_assert_eq!(first.severity == Severity::Fatal, lost);
    }

    /// Property: any terminating fatal verdict terminates, and the recorded
    /// cause does not depend on verdict order
    #[test]
    fn prop_fatal_cause_is_order_independent(verdicts in verdicts_strategy()) {
        let aggregator = VerdictAggregator::new();
        let expected = verdicts
            .iter()
            .filter(|v| v.is_fatal())
            .filter_map(|v| v.check.error_kind().map(|kind| (v.check, kind)))
            .min_by_key(|(check, _)| *check)
            .map(|(_, kind)| kind);

        let mut reversed = verdicts.clone();
        reversed.reverse();

        for ordering in [&verdicts, &reversed] {
            match (aggregator.aggregate(ordering), expected) {
                (LifecycleDecision::Terminate { cause }, Some(kind)) => {
                    prop_assert_eq!(cause.kind, kind);
                }
                (LifecycleDecision::Terminate { .. }, None) => {
                    prop_assert!(false, "terminated without a terminating verdict");
                }
                (decision, Some(_)) => {
                    prop_assert!(false, "expected terminate, got {:?}", decision);
                }
                (LifecycleDecision::ContinueWithWarning { warnings }, None) => {
                    prop_assert!(!warnings.is_empty());
                }
                (LifecycleDecision::Continue, None) => {
                    prop_assert!(ordering.iter().all(|v| v.severity != Severity::Warn));
                }
                (LifecycleDecision::Idle, None) => {
                    prop_assert!(false, "non-empty tick reported idle");
                }
            }
        }
    }

    /// Property: the payload is signalled once however many fatal ticks follow
    #[test]
    fn prop_kill_is_issued_once(repeats in 1usize..20) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (terminates, status) = runtime.block_on(async {
            let (control, _exit) = MockControl::new(ExitOn::Never);
            let mut controller = LifecycleController::new(
                JobState::new("p", "SCORE", Utc::now()),
                control.clone(),
                Duration::from_secs(1),
            );
            for i in 0..repeats {
                let decision = LifecycleDecision::external_stop(format!("stop {i}"));
                controller.apply(&decision, Utc::now()).await.unwrap();
            }
            (control.terminate_count(), controller.status())
        });

        prop_assert_eq!(terminates, 1);
        prop_assert_eq!(status, LifecycleStatus::Killing);
    }
}
