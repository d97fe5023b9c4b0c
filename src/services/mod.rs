//! Monitoring engine services
//!
//! Pure decision logic plus the per-job controller:
//! - checks: the monitored conditions
//! - CheckScheduler: per-check cadences on a cooperative tick
//! - VerdictAggregator: one decision per tick
//! - LifecycleController: the job's state machine and kill escalation

pub mod check_scheduler;
pub mod checks;
pub mod lifecycle_controller;
pub mod verdict_aggregator;

pub use check_scheduler::CheckScheduler;
pub use checks::{Check, OutputSampler, Probes};
pub use lifecycle_controller::LifecycleController;
pub use verdict_aggregator::VerdictAggregator;
