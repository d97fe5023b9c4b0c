//! Local disk space check.
//!
//! Below `free_space_floor` (the space a job needs to start) the check
//! warns. Below `free_space_floor_running` the job cannot safely keep
//! writing and the check is fatal.

use std::sync::Arc;

use crate::domain::models::{CheckKind, Observation, ThresholdRegistry, Verdict};
use crate::domain::ports::{DiskUsage, ResourceProbe};

use super::{bounded, human_bytes};

pub struct FreeSpaceCheck {
    probe: Arc<dyn ResourceProbe>,
}

impl FreeSpaceCheck {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self { probe }
    }

    pub async fn evaluate(&self, registry: &ThresholdRegistry) -> Verdict {
        match bounded(registry.probe_timeout, self.probe.disk_usage()).await {
            Ok(usage) => classify(usage, registry).with_observation(Observation::Disk {
                available: usage.available,
                used: usage.used,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "disk usage probe failed");
                Verdict::probe_unavailable(CheckKind::FreeSpace).with_detail(e.to_string())
            }
        }
    }
}

pub fn classify(usage: DiskUsage, registry: &ThresholdRegistry) -> Verdict {
    let available = usage.available;

    if available == 0 || available < registry.free_space_floor_running {
        Verdict::fatal(CheckKind::FreeSpace, "no_local_space").with_detail(format!(
            "{} available, running floor is {}",
            human_bytes(available),
            human_bytes(registry.free_space_floor_running)
        ))
    } else if available < registry.free_space_floor {
        Verdict::warn(CheckKind::FreeSpace, "low_local_space").with_detail(format!(
            "{} available, floor is {}",
            human_bytes(available),
            human_bytes(registry.free_space_floor)
        ))
    } else {
        Verdict::ok(CheckKind::FreeSpace, "enough_local_space")
    }
}
