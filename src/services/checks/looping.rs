//! Looping payload detection.
//!
//! A payload that stops touching its output files is suspected to be stuck.
//! Inactivity is measured from the newest of the recorded activity, the
//! freshly probed output modification time, and the job start.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::{CheckKind, JobState, Observation, ThresholdRegistry, Verdict};

use super::{elapsed, human, OutputSampler};

pub struct LoopingCheck {
    output: Arc<OutputSampler>,
}

impl LoopingCheck {
    pub fn new(output: Arc<OutputSampler>) -> Self {
        Self { output }
    }

    pub async fn evaluate(
        &self,
        state: &JobState,
        registry: &ThresholdRegistry,
        now: DateTime<Utc>,
    ) -> Verdict {
        match self.output.sample(registry.probe_timeout, now).await {
            Ok(activity) => {
                classify(state, activity.last_modified, registry, now).with_observation(
                    Observation::OutputActivity {
                        last_modified: activity.last_modified,
                        largest_file: activity.largest_file,
                    },
                )
            }
            Err(e) => {
                tracing::warn!(job_id = %state.id, error = %e, "output activity probe failed");
                Verdict::probe_unavailable(CheckKind::Looping).with_detail(e.to_string())
            }
        }
    }
}

pub fn classify(
    state: &JobState,
    probed_activity: Option<DateTime<Utc>>,
    registry: &ThresholdRegistry,
    now: DateTime<Utc>,
) -> Verdict {
    let idle = elapsed(state.output_activity_reference(probed_activity), now);

    if idle > registry.looping_limit {
        Verdict::fatal(CheckKind::Looping, "looping_job").with_detail(format!(
            "no output activity for {} (looping limit {})",
            human(idle),
            human(registry.looping_limit)
        ))
    } else if idle > registry.looping_verification_window {
        Verdict::warn(CheckKind::Looping, "no_output_activity").with_detail(format!(
            "no output activity for {} (verification window {})",
            human(idle),
            human(registry.looping_verification_window)
        ))
    } else {
        Verdict::ok(CheckKind::Looping, "output_active")
    }
}
