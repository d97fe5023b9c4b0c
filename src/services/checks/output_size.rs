//! Output file growth check.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::{CheckKind, Observation, ThresholdRegistry, Verdict};

use super::{exceeds_fraction, human_bytes, OutputSampler, WARN_FRACTION};

pub struct OutputSizeCheck {
    output: Arc<OutputSampler>,
}

impl OutputSizeCheck {
    pub fn new(output: Arc<OutputSampler>) -> Self {
        Self { output }
    }

    pub async fn evaluate(&self, registry: &ThresholdRegistry, now: DateTime<Utc>) -> Verdict {
        match self.output.sample(registry.probe_timeout, now).await {
            Ok(activity) => classify(activity.largest_file, registry).with_observation(
                Observation::OutputActivity {
                    last_modified: activity.last_modified,
                    largest_file: activity.largest_file,
                },
            ),
            Err(e) => {
                tracing::warn!(error = %e, "output size probe failed");
                Verdict::probe_unavailable(CheckKind::OutputSize).with_detail(e.to_string())
            }
        }
    }
}

pub fn classify(largest_file: u64, registry: &ThresholdRegistry) -> Verdict {
    let limit = registry.max_output_file_size;

    if largest_file > limit {
        Verdict::fatal(CheckKind::OutputSize, "output_too_large").with_detail(format!(
            "output file of {} exceeds {}",
            human_bytes(largest_file),
            human_bytes(limit)
        ))
    } else if exceeds_fraction(largest_file, limit, WARN_FRACTION) {
        Verdict::warn(CheckKind::OutputSize, "output_near_limit").with_detail(format!(
            "output file of {} approaches {}",
            human_bytes(largest_file),
            human_bytes(limit)
        ))
    } else {
        Verdict::ok(CheckKind::OutputSize, "output_within_limit")
    }
}
