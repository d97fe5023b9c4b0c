//! Heartbeat staleness check.
//!
//! Measured from the last acknowledged heartbeat, or from the job start when
//! no heartbeat has been acknowledged yet. Needs no probe.

use chrono::{DateTime, Utc};

use crate::domain::models::{CheckKind, JobState, ThresholdRegistry, Verdict};

use super::{elapsed, human};

pub struct LastHeartbeatCheck;

impl LastHeartbeatCheck {
    pub fn evaluate(
        &self,
        state: &JobState,
        registry: &ThresholdRegistry,
        now: DateTime<Utc>,
    ) -> Verdict {
        classify(state, registry, now)
    }
}

pub fn classify(state: &JobState, registry: &ThresholdRegistry, now: DateTime<Utc>) -> Verdict {
    let silence = elapsed(state.heartbeat_reference(), now);
    let period = registry.effective_heartbeat_period(state.debug_mode);

    if silence > registry.lost_heartbeat_timeout {
        Verdict::fatal(CheckKind::LastHeartbeat, "lost_heartbeat").with_detail(format!(
            "no heartbeat acknowledged for {} (limit {})",
            human(silence),
            human(registry.lost_heartbeat_timeout)
        ))
    } else if silence > period {
        Verdict::warn(CheckKind::LastHeartbeat, "heartbeat_overdue").with_detail(format!(
            "no heartbeat acknowledged for {} (period {})",
            human(silence),
            human(period)
        ))
    } else {
        Verdict::ok(CheckKind::LastHeartbeat, "heartbeat_current")
    }
}
