//! CPU usage sampling. Informational only: never warns on usage, never kills.

use std::sync::Arc;

use crate::domain::models::{CheckKind, Observation, ThresholdRegistry, Verdict};
use crate::domain::ports::ResourceProbe;

use super::bounded;

pub struct CpuUsageCheck {
    probe: Arc<dyn ResourceProbe>,
}

impl CpuUsageCheck {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self { probe }
    }

    pub async fn evaluate(&self, registry: &ThresholdRegistry) -> Verdict {
        match bounded(registry.probe_timeout, self.probe.cpu_used()).await {
            Ok(percent) => Verdict::ok(CheckKind::CpuUsage, "cpu_sampled")
                .with_detail(format!("payload cpu usage {percent:.1}%"))
                .with_observation(Observation::CpuUsed { percent }),
            Err(e) => {
                tracing::warn!(error = %e, "cpu probe failed");
                Verdict::probe_unavailable(CheckKind::CpuUsage).with_detail(e.to_string())
            }
        }
    }
}
