pub mod config;
pub mod job;
pub mod thresholds;
pub mod verdict;

pub use config::{
    ConfigValue, HarvesterSection, LogFormat, LoggingConfig, PayloadSection, PilotConfig,
    PilotSection, RotationPolicy, TokenSection,
};
pub use job::{ErrorKind, JobState, LifecycleStatus, PendingError};
pub use thresholds::{CheckIntervals, MemoryLimit, ThresholdRegistry};
pub use verdict::{
    CheckKind, LifecycleDecision, Observation, Severity, SuggestedAction, Verdict,
    PROBE_UNAVAILABLE,
};
