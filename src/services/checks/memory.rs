//! Memory ceiling check, per resource class.

use std::sync::Arc;

use crate::domain::models::{
    CheckKind, JobState, MemoryLimit, Observation, ThresholdRegistry, Verdict,
};
use crate::domain::ports::ResourceProbe;

use super::{bounded, exceeds_fraction, human_bytes, WARN_FRACTION};

pub struct MemoryUsageCheck {
    probe: Arc<dyn ResourceProbe>,
}

impl MemoryUsageCheck {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self { probe }
    }

    pub async fn evaluate(&self, state: &JobState, registry: &ThresholdRegistry) -> Verdict {
        let limit = registry.memory_limit(&state.resource_class);

        match bounded(registry.probe_timeout, self.probe.memory_used()).await {
            Ok(used) => classify(used, limit).with_observation(Observation::MemoryUsed { bytes: used }),
            Err(e) => {
                tracing::warn!(job_id = %state.id, error = %e, "memory probe failed");
                Verdict::probe_unavailable(CheckKind::MemoryUsage).with_detail(e.to_string())
            }
        }
    }
}

pub fn classify(used: u64, limit: MemoryLimit) -> Verdict {
    let MemoryLimit::Bounded(ceiling) = limit else {
        return Verdict::ok(CheckKind::MemoryUsage, "no_memory_limit");
    };

    if used > ceiling {
        Verdict::fatal(CheckKind::MemoryUsage, "memory_exceeded").with_detail(format!(
            "payload uses {} of {} allowed",
            human_bytes(used),
            human_bytes(ceiling)
        ))
    } else if exceeds_fraction(used, ceiling, WARN_FRACTION) {
        Verdict::warn(CheckKind::MemoryUsage, "memory_near_limit").with_detail(format!(
            "payload uses {} of {} allowed",
            human_bytes(used),
            human_bytes(ceiling)
        ))
    } else {
        Verdict::ok(CheckKind::MemoryUsage, "memory_within_limit")
    }
}
