//! Threshold registry domain model.
//!
//! Every interval and limit the monitoring engine consults, normalized to
//! bytes and [`Duration`]s. Built once by the configuration loader and shared
//! read-only behind an `Arc` for the lifetime of the process.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// Memory ceiling for a resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "bytes")]
pub enum MemoryLimit {
    /// Hard ceiling in bytes.
    Bounded(u64),
    /// No ceiling configured for this class.
    Unbounded,
}

impl MemoryLimit {
    /// Ceiling in bytes, `None` when unbounded.
    pub const fn bytes(&self) -> Option<u64> {
        match self {
            Self::Bounded(bytes) => Some(*bytes),
            Self::Unbounded => None,
        }
    }

    pub const fn is_bounded(&self) -> bool {
        matches!(self, Self::Bounded(_))
    }
}

/// Per-check evaluation cadences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIntervals {
    pub disk: Duration,
    pub memory: Duration,
    pub process: Duration,
    pub output: Duration,
    pub thread: Duration,
    pub cpu: Duration,
}

impl CheckIntervals {
    /// Smallest configured interval.
    pub fn min(&self) -> Duration {
        [
            self.disk,
            self.memory,
            self.process,
            self.output,
            self.thread,
            self.cpu,
        ]
        .into_iter()
        .min()
        .unwrap_or(Duration::ZERO)
    }
}

/// Immutable snapshot of all configured thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdRegistry {
    pub heartbeat_period: Duration,
    pub lost_heartbeat_timeout: Duration,
    pub debug_heartbeat_period: Duration,

    pub free_space_floor: u64,
    pub free_space_floor_running: u64,

    pub max_output_file_size: u64,
    pub max_input_file_total: u64,

    pub looping_verification_window: Duration,
    pub looping_limit: Duration,

    pub kill_instruction_poll_interval: Duration,
    pub kill_instruction_time: Duration,
    pub kill_instruction_filename: String,

    pub proxy_verification_time: Duration,
    pub proxy_check_interval: Duration,
    pub token_refresh_period: Duration,

    pub memory_limits: BTreeMap<String, MemoryLimit>,
    pub check_intervals: CheckIntervals,

    /// Upper bound on any single probe.
    pub probe_timeout: Duration,
    /// Wait between the graceful kill and the forced one.
    pub kill_grace_period: Duration,
    /// Cadence of the scheduler's base tick.
    pub tick_interval: Duration,
    /// Gap in the pilot's own heartbeat that counts as a suspension.
    pub suspension_limit: Duration,
}

impl ThresholdRegistry {
    /// Memory ceiling for `resource_class`. Classes without an entry are unbounded.
    pub fn memory_limit(&self, resource_class: &str) -> MemoryLimit {
        self.memory_limits
            .get(resource_class)
            .copied()
            .unwrap_or(MemoryLimit::Unbounded)
    }

    /// Heartbeat period in effect for a job.
    pub const fn effective_heartbeat_period(&self, debug_mode: bool) -> Duration {
        if debug_mode {
            self.debug_heartbeat_period
        } else {
            self.heartbeat_period
        }
    }

    /// Whether staging `total_bytes` of input is allowed.
    pub const fn input_total_allowed(&self, total_bytes: u64) -> bool {
        total_bytes <= self.max_input_file_total
    }

    /// A registry with the reference pilot's defaults, used by tests and benches.
    pub fn reference() -> Self {
        const MB: u64 = 1024 * 1024;
        const GB: u64 = 1024 * MB;

        let mut memory_limits = BTreeMap::new();
        memory_limits.insert("MCORE".to_string(), MemoryLimit::Bounded(1001 * MB));
        memory_limits.insert("MCORE_HIMEM".to_string(), MemoryLimit::Bounded(2001 * MB));
        memory_limits.insert("MCORE_LOMEM".to_string(), MemoryLimit::Unbounded);
        memory_limits.insert("SCORE".to_string(), MemoryLimit::Bounded(1001 * MB));
        memory_limits.insert("SCORE_HIMEM".to_string(), MemoryLimit::Bounded(2001 * MB));
        memory_limits.insert("SCORE_LOMEM".to_string(), MemoryLimit::Unbounded);

        Self {
            heartbeat_period: Duration::from_secs(1800),
            lost_heartbeat_timeout: Duration::from_secs(10800),
            debug_heartbeat_period: Duration::from_secs(60),
            free_space_floor: 2 * GB,
            free_space_floor_running: GB,
            max_output_file_size: 500 * GB,
            max_input_file_total: 14336 * MB,
            looping_verification_window: Duration::from_secs(900),
            looping_limit: Duration::from_secs(7200),
            kill_instruction_poll_interval: Duration::from_secs(60),
            kill_instruction_time: Duration::from_secs(120),
            kill_instruction_filename: "pilot_kill_payload".to_string(),
            proxy_verification_time: Duration::from_secs(600),
            proxy_check_interval: Duration::from_secs(600),
            token_refresh_period: Duration::from_secs(3600),
            memory_limits,
            check_intervals: CheckIntervals {
                disk: Duration::from_secs(300),
                memory: Duration::from_secs(60),
                process: Duration::from_secs(300),
                output: Duration::from_secs(300),
                thread: Duration::from_secs(60),
                cpu: Duration::from_secs(60),
            },
            probe_timeout: Duration::from_secs(30),
            kill_grace_period: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
            suspension_limit: Duration::from_secs(600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_class_is_unbounded() {
        let registry = ThresholdRegistry::reference();
        assert_eq!(registry.memory_limit("NOT_A_CLASS"), MemoryLimit::Unbounded);
        assert!(registry.memory_limit("MCORE").is_bounded());
    }

    #[test]
    fn test_unbounded_is_distinct_from_zero() {
        assert_ne!(MemoryLimit::Unbounded, MemoryLimit::Bounded(0));
        assert_eq!(MemoryLimit::Bounded(0).bytes(), Some(0));
        assert_eq!(MemoryLimit::Unbounded.bytes(), None);
    }

    #[test]
    fn test_effective_heartbeat_period() {
        let registry = ThresholdRegistry::reference();
        assert_eq!(
            registry.effective_heartbeat_period(false),
            Duration::from_secs(1800)
        );
        assert_eq!(
            registry.effective_heartbeat_period(true),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_min_check_interval() {
        let registry = ThresholdRegistry::reference();
        assert_eq!(registry.check_intervals.min(), Duration::from_secs(60));
    }

    #[test]
    fn test_input_total_gate() {
        let registry = ThresholdRegistry::reference();
        assert!(registry.input_total_allowed(1024));
        assert!(!registry.input_total_allowed(registry.max_input_file_total + 1));
    }
}
