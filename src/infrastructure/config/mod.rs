//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Unit normalization into a ThresholdRegistry
//! - Cross-field validation

pub mod loader;
pub mod units;

pub use loader::{ConfigError, ConfigLoader, ProxySettings, ENV_PREFIX};
