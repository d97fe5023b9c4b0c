use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::{
    CheckIntervals, ConfigValue, LoggingConfig, PilotConfig, ThresholdRegistry,
};

use super::units;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid duration for {key}: '{value}' ({reason})")]
    InvalidDuration {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid byte size for {key}: '{value}' ({reason})")]
    InvalidByteSize {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Negative value for {key}: '{value}'")]
    Negative { key: String, value: String },

    #[error("probe_timeout ({probe_timeout:?}) must be shorter than {interval_name} ({interval:?})")]
    ProbeTimeoutTooLarge {
        probe_timeout: Duration,
        interval_name: String,
        interval: Duration,
    },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Prefix of environment overrides, e.g. `PILOT_PILOT__HEARTBEAT=60`.
pub const ENV_PREFIX: &str = "PILOT_";

const DEFAULT_KILL_INSTRUCTION_TIME: Duration = Duration::from_secs(120);
const DEFAULT_PROXY_VERIFICATION_TIME: Duration = Duration::from_secs(600);
const DEFAULT_PROXY_CHECK_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_TOKEN_REFRESH_PERIOD: Duration = Duration::from_secs(3600);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_KILL_GRACE_PERIOD: Duration = Duration::from_secs(60);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_SUSPENSION_LIMIT: Duration = Duration::from_secs(600);

/// Where the proxy lives and how long a renewal lasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub file: PathBuf,
    pub lifetime: Duration,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the configuration document from `path`
    ///
    /// Precedence (lowest to highest):
    /// 1. Serde defaults of the document structs
    /// 2. The YAML file
    /// 3. Environment variables (`PILOT_` prefix, `__` separates nesting)
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<PilotConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let config: PilotConfig = Figment::new()
            .merge(Serialized::defaults(PilotConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Self::validate_logging(&config.logging)?;
        Ok(config)
    }

    /// Load the configuration document from a YAML string, without env overrides
    pub fn load_from_str(yaml: &str) -> Result<PilotConfig, ConfigError> {
        let config: PilotConfig = Figment::new()
            .merge(Serialized::defaults(PilotConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(Box::new)?;

        Self::validate_logging(&config.logging)?;
        Ok(config)
    }

    /// Load a file and build its registry in one step
    pub fn load_registry(
        path: impl AsRef<Path>,
    ) -> Result<(PilotConfig, ThresholdRegistry), ConfigError> {
        let config = Self::load_from_file(path)?;
        let registry = Self::build_registry(&config)?;
        Ok((config, registry))
    }

    /// Normalize the `pilot` and `token` sections into a [`ThresholdRegistry`]
    pub fn build_registry(config: &PilotConfig) -> Result<ThresholdRegistry, ConfigError> {
        let pilot = &config.pilot;
        let token = &config.token;

        let memory_limits = pilot
            .memory_limits
            .as_ref()
            .ok_or_else(|| ConfigError::MissingKey("pilot.memory_limits".to_string()))?
            .iter()
            .map(|(class, limit)| {
                let key = format!("pilot.memory_limits.{class}");
                units::memory_limit(&key, limit.as_ref()).map(|limit| (class.clone(), limit))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let registry = ThresholdRegistry {
            heartbeat_period: required_duration("pilot.heartbeat", &pilot.heartbeat)?,
            lost_heartbeat_timeout: required_duration("pilot.lost_heartbeat", &pilot.lost_heartbeat)?,
            debug_heartbeat_period: required_duration(
                "pilot.debug_heartbeat",
                &pilot.debug_heartbeat,
            )?,
            free_space_floor: required_bytes("pilot.free_space_limit", &pilot.free_space_limit)?,
            free_space_floor_running: required_bytes(
                "pilot.free_space_limit_running",
                &pilot.free_space_limit_running,
            )?,
            max_output_file_size: required_bytes(
                "pilot.maximum_output_file_size",
                &pilot.maximum_output_file_size,
            )?,
            max_input_file_total: required_bytes(
                "pilot.maximum_input_file_sizes",
                &pilot.maximum_input_file_sizes,
            )?,
            looping_verification_window: required_duration(
                "pilot.looping_verification_time",
                &pilot.looping_verification_time,
            )?,
            looping_limit: required_duration(
                "pilot.looping_limit_default",
                &pilot.looping_limit_default,
            )?,
            kill_instruction_poll_interval: required_duration(
                "pilot.kill_instruction_interval",
                &pilot.kill_instruction_interval,
            )?,
            kill_instruction_time: optional_duration(
                "pilot.kill_instruction_time",
                &pilot.kill_instruction_time,
                DEFAULT_KILL_INSTRUCTION_TIME,
            )?,
            kill_instruction_filename: pilot.kill_instruction_filename.clone(),
            proxy_verification_time: optional_duration(
                "token.proxy_verification_time",
                &token.proxy_verification_time,
                DEFAULT_PROXY_VERIFICATION_TIME,
            )?,
            proxy_check_interval: optional_duration(
                "token.proxy_check_interval",
                &token.proxy_check_interval,
                DEFAULT_PROXY_CHECK_INTERVAL,
            )?,
            token_refresh_period: optional_duration(
                "token.token_refresh_period",
                &token.token_refresh_period,
                DEFAULT_TOKEN_REFRESH_PERIOD,
            )?,
            memory_limits,
            check_intervals: CheckIntervals {
                disk: required_duration("pilot.disk_check_interval", &pilot.disk_check_interval)?,
                memory: required_duration(
                    "pilot.memory_check_interval",
                    &pilot.memory_check_interval,
                )?,
                process: required_duration(
                    "pilot.process_check_interval",
                    &pilot.process_check_interval,
                )?,
                output: required_duration(
                    "pilot.output_check_interval",
                    &pilot.output_check_interval,
                )?,
                thread: required_duration(
                    "pilot.thread_check_interval",
                    &pilot.thread_check_interval,
                )?,
                cpu: required_duration("pilot.cpu_check_interval", &pilot.cpu_check_interval)?,
            },
            probe_timeout: optional_duration(
                "pilot.probe_timeout",
                &pilot.probe_timeout,
                DEFAULT_PROBE_TIMEOUT,
            )?,
            kill_grace_period: optional_duration(
                "pilot.kill_grace_period",
                &pilot.kill_grace_period,
                DEFAULT_KILL_GRACE_PERIOD,
            )?,
            tick_interval: optional_duration(
                "pilot.tick_interval",
                &pilot.tick_interval,
                DEFAULT_TICK_INTERVAL,
            )?,
            suspension_limit: optional_duration(
                "pilot.suspension_limit",
                &pilot.suspension_limit,
                DEFAULT_SUSPENSION_LIMIT,
            )?,
        };

        Self::validate(&registry)?;
        Ok(registry)
    }

    /// Proxy location and lifetime, `None` when no proxy file is configured
    pub fn proxy_settings(config: &PilotConfig) -> Result<Option<ProxySettings>, ConfigError> {
        let Some(file) = config.token.proxy_file.clone() else {
            return Ok(None);
        };
        let lifetime = required_duration("token.proxy_lifetime", &config.token.proxy_lifetime)?;
        Ok(Some(ProxySettings { file, lifetime }))
    }

    /// Cross-field validation of a built registry
    pub fn validate(registry: &ThresholdRegistry) -> Result<(), ConfigError> {
        if registry.lost_heartbeat_timeout <= registry.heartbeat_period {
            return Err(ConfigError::ValidationFailed(format!(
                "lost_heartbeat ({:?}) must exceed heartbeat ({:?})",
                registry.lost_heartbeat_timeout, registry.heartbeat_period
            )));
        }

        if registry.looping_limit <= registry.looping_verification_window {
            return Err(ConfigError::ValidationFailed(format!(
                "looping_limit_default ({:?}) must exceed looping_verification_time ({:?})",
                registry.looping_limit, registry.looping_verification_window
            )));
        }

        if registry.free_space_floor_running > registry.free_space_floor {
            return Err(ConfigError::ValidationFailed(format!(
                "free_space_limit_running ({} B) must not exceed free_space_limit ({} B)",
                registry.free_space_floor_running, registry.free_space_floor
            )));
        }

        if registry.tick_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "tick_interval must be positive".to_string(),
            ));
        }

        let intervals = &registry.check_intervals;
        let named = [
            ("disk_check_interval", intervals.disk),
            ("memory_check_interval", intervals.memory),
            ("process_check_interval", intervals.process),
            ("output_check_interval", intervals.output),
            ("thread_check_interval", intervals.thread),
            ("cpu_check_interval", intervals.cpu),
            ("kill_instruction_interval", registry.kill_instruction_poll_interval),
            ("proxy_check_interval", registry.proxy_check_interval),
        ];
        for (name, interval) in named {
            if registry.probe_timeout >= interval {
                return Err(ConfigError::ProbeTimeoutTooLarge {
                    probe_timeout: registry.probe_timeout,
                    interval_name: name.to_string(),
                    interval,
                });
            }
        }

        Ok(())
    }

    /// Validate logging settings after extraction
    pub fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(logging.level.clone()));
        }
        Ok(())
    }
}

fn required_duration(key: &str, value: &Option<ConfigValue>) -> Result<Duration, ConfigError> {
    let value = value
        .as_ref()
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    units::duration(key, value)
}

fn optional_duration(
    key: &str,
    value: &Option<ConfigValue>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    value
        .as_ref()
        .map_or(Ok(default), |value| units::duration(key, value))
}

fn required_bytes(key: &str, value: &Option<ConfigValue>) -> Result<u64, ConfigError> {
    let value = value
        .as_ref()
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    units::byte_size(key, value)
}
