//! Pilot watchdog - monitoring and lifecycle enforcement for grid payloads
//!
//! The watchdog launches a payload, periodically checks its resource usage
//! and the pilot's environment against configured thresholds, reports
//! heartbeats, and kills the payload when a check decides it must stop.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): job state, thresholds, verdicts and ports
//! - **Service Layer** (`services`): checks, scheduling, aggregation and the lifecycle state machine
//! - **Application Layer** (`application`): per-job monitors and the pilot agent
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, probes and adapters
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use pilot_watchdog::infrastructure::config::ConfigLoader;
//!
//! let (_config, registry) = ConfigLoader::load_registry("config/default.yaml")?;
//! assert!(registry.lost_heartbeat_timeout > registry.heartbeat_period);
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{JobMonitor, PilotAgent};
pub use domain::models::{
    CheckKind, ErrorKind, JobState, LifecycleDecision, LifecycleStatus, PendingError, Severity,
    ThresholdRegistry, Verdict,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Check, CheckScheduler, LifecycleController, VerdictAggregator};
