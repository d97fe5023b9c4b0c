//! Monitored conditions.
//!
//! Every condition is a variant of [`Check`] sharing one capability:
//! `evaluate(state, registry, now) -> Verdict`. Checks never mutate the job
//! state. Probe samples travel back inside the verdict as an
//! [`Observation`](crate::domain::models::Observation) and are folded in by
//! the caller.
//!
//! Each check has a pure `classify` function holding its threshold rule and
//! an async `evaluate` that takes the probe sample under the configured
//! probe timeout. A probe that errors or times out always yields a warn
//! verdict with reason `probe_unavailable`.

pub mod cpu;
pub mod free_space;
pub mod heartbeat;
pub mod kill_instruction;
pub mod looping;
pub mod memory;
pub mod output_size;
pub mod proxy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::errors::ProbeError;
use crate::domain::models::{CheckKind, JobState, ThresholdRegistry, Verdict};
use crate::domain::ports::{KillInstructionSource, OutputActivity, ProxyInspector, ResourceProbe};

pub use cpu::CpuUsageCheck;
pub use free_space::FreeSpaceCheck;
pub use heartbeat::LastHeartbeatCheck;
pub use kill_instruction::KillInstructionCheck;
pub use looping::LoopingCheck;
pub use memory::MemoryUsageCheck;
pub use output_size::OutputSizeCheck;
pub use proxy::ProxyCheck;

/// Probes shared by the checks of one job.
#[derive(Clone)]
pub struct Probes {
    pub resources: Arc<dyn ResourceProbe>,
    pub proxy: Arc<dyn ProxyInspector>,
    pub kill_instructions: Arc<dyn KillInstructionSource>,
}

/// One monitored condition.
pub enum Check {
    Proxy(ProxyCheck),
    FreeSpace(FreeSpaceCheck),
    LastHeartbeat(LastHeartbeatCheck),
    Looping(LoopingCheck),
    MemoryUsage(MemoryUsageCheck),
    OutputSize(OutputSizeCheck),
    CpuUsage(CpuUsageCheck),
    KillInstructionFile(KillInstructionCheck),
}

impl Check {
    /// The full check set for one job, in declared order.
    pub fn standard_set(probes: &Probes) -> Vec<Self> {
        let output = OutputSampler::new(probes.resources.clone());
        vec![
            Self::Proxy(ProxyCheck::new(probes.proxy.clone())),
            Self::FreeSpace(FreeSpaceCheck::new(probes.resources.clone())),
            Self::LastHeartbeat(LastHeartbeatCheck),
            Self::Looping(LoopingCheck::new(output.clone())),
            Self::MemoryUsage(MemoryUsageCheck::new(probes.resources.clone())),
            Self::OutputSize(OutputSizeCheck::new(output)),
            Self::CpuUsage(CpuUsageCheck::new(probes.resources.clone())),
            Self::KillInstructionFile(KillInstructionCheck::new(
                probes.kill_instructions.clone(),
            )),
        ]
    }

    pub const fn kind(&self) -> CheckKind {
        match self {
            Self::Proxy(_) => CheckKind::Proxy,
            Self::FreeSpace(_) => CheckKind::FreeSpace,
            Self::LastHeartbeat(_) => CheckKind::LastHeartbeat,
            Self::Looping(_) => CheckKind::Looping,
            Self::MemoryUsage(_) => CheckKind::MemoryUsage,
            Self::OutputSize(_) => CheckKind::OutputSize,
            Self::CpuUsage(_) => CheckKind::CpuUsage,
            Self::KillInstructionFile(_) => CheckKind::KillInstructionFile,
        }
    }

    /// Evaluation cadence of this check.
    pub const fn interval(&self, registry: &ThresholdRegistry) -> Duration {
        let intervals = &registry.check_intervals;
        match self {
            Self::Proxy(_) => registry.proxy_check_interval,
            Self::FreeSpace(_) => intervals.disk,
            Self::LastHeartbeat(_) => intervals.process,
            Self::Looping(_) | Self::OutputSize(_) => intervals.output,
            Self::MemoryUsage(_) => intervals.memory,
            Self::CpuUsage(_) => intervals.cpu,
            Self::KillInstructionFile(_) => registry.kill_instruction_poll_interval,
        }
    }

    pub async fn evaluate(
        &self,
        state: &JobState,
        registry: &ThresholdRegistry,
        now: DateTime<Utc>,
    ) -> Verdict {
        let verdict = match self {
            Self::Proxy(check) => check.evaluate(registry).await,
            Self::FreeSpace(check) => check.evaluate(registry).await,
            Self::LastHeartbeat(check) => check.evaluate(state, registry, now),
            Self::Looping(check) => check.evaluate(state, registry, now).await,
            Self::MemoryUsage(check) => check.evaluate(state, registry).await,
            Self::OutputSize(check) => check.evaluate(registry, now).await,
            Self::CpuUsage(check) => check.evaluate(registry).await,
            Self::KillInstructionFile(check) => check.evaluate(registry, now).await,
        };

        debug!(
            job_id = %state.id,
            check = %verdict.check,
            severity = %verdict.severity,
            reason = %verdict.reason,
            "check evaluated"
        );

        verdict
    }
}

/// Output activity sampled at most once per tick.
///
/// The looping and output size checks read the same directory walk; the
/// first of them due at a given `now` takes the sample and the other reuses
/// it.
pub struct OutputSampler {
    probe: Arc<dyn ResourceProbe>,
    last: Mutex<Option<(DateTime<Utc>, Result<OutputActivity, String>)>>,
}

impl OutputSampler {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Arc<Self> {
        Arc::new(Self {
            probe,
            last: Mutex::new(None),
        })
    }

    pub async fn sample(
        &self,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<OutputActivity, ProbeError> {
        let mut last = self.last.lock().await;
        if let Some((taken_at, sample)) = last.as_ref() {
            if *taken_at == now {
                return sample.clone().map_err(ProbeError::Unavailable);
            }
        }

        let result = bounded(timeout, self.probe.output_activity()).await;
        let shared = match &result {
            Ok(activity) => Ok(*activity),
            Err(e) => Err(e.to_string()),
        };
        *last = Some((now, shared));
        result
    }
}

/// Run a probe under `timeout`, turning an elapsed deadline into [`ProbeError::Timeout`].
pub async fn bounded<T, F>(timeout: Duration, probe: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Time elapsed from `since` to `now`, zero when `since` lies in the future.
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Human-readable duration for diagnostics.
pub(crate) fn human(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

/// Human-readable byte count for diagnostics.
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// True when `value` exceeds `fraction` of `limit`.
pub(crate) fn exceeds_fraction(value: u64, limit: u64, fraction: f64) -> bool {
    #[allow(clippy::cast_precision_loss)]
    let threshold = limit as f64 * fraction;
    #[allow(clippy::cast_precision_loss)]
    let value = value as f64;
    value > threshold
}

/// Fraction of a ceiling above which usage checks warn.
pub const WARN_FRACTION: f64 = 0.9;
