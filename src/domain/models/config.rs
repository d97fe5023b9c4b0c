use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw scalar as it appears in the configuration document.
///
/// Units are resolved later, when the document is turned into a
/// `ThresholdRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Free-form section the monitoring engine does not interpret.
pub type PassthroughSection = BTreeMap<String, serde_json::Value>;

/// Main configuration document for the pilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PilotConfig {
    /// Thresholds and intervals consumed by the monitoring engine
    #[serde(default)]
    pub pilot: PilotSection,

    /// Payload execution settings
    #[serde(default)]
    pub payload: PayloadSection,

    /// Token and proxy settings
    #[serde(default)]
    pub token: TokenSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub information: PassthroughSection,
    #[serde(default)]
    pub container: PassthroughSection,
    #[serde(default)]
    pub harvester: HarvesterSection,
    #[serde(default)]
    pub hpc: PassthroughSection,
    #[serde(default)]
    pub file: PassthroughSection,
    #[serde(default)]
    pub rucio: PassthroughSection,
    #[serde(default)]
    pub message_broker: PassthroughSection,
}

/// `pilot` section. Every threshold is required; the loader reports absent keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PilotSection {
    pub heartbeat: Option<ConfigValue>,
    pub debug_heartbeat: Option<ConfigValue>,
    pub lost_heartbeat: Option<ConfigValue>,

    pub free_space_limit: Option<ConfigValue>,
    pub free_space_limit_running: Option<ConfigValue>,

    pub maximum_output_file_size: Option<ConfigValue>,
    pub maximum_input_file_sizes: Option<ConfigValue>,

    pub looping_verification_time: Option<ConfigValue>,
    pub looping_limit_default: Option<ConfigValue>,

    pub kill_instruction_interval: Option<ConfigValue>,
    pub kill_instruction_time: Option<ConfigValue>,
    #[serde(default = "default_kill_instruction_filename")]
    pub kill_instruction_filename: String,

    /// Resource class to memory ceiling; `null` or `"unbounded"` means no ceiling
    #[serde(default)]
    pub memory_limits: Option<BTreeMap<String, Option<ConfigValue>>>,

    pub disk_check_interval: Option<ConfigValue>,
    pub memory_check_interval: Option<ConfigValue>,
    pub process_check_interval: Option<ConfigValue>,
    pub output_check_interval: Option<ConfigValue>,
    pub thread_check_interval: Option<ConfigValue>,
    pub cpu_check_interval: Option<ConfigValue>,

    pub probe_timeout: Option<ConfigValue>,
    pub kill_grace_period: Option<ConfigValue>,
    pub tick_interval: Option<ConfigValue>,
    pub suspension_limit: Option<ConfigValue>,

    /// Pilot's own liveness file
    #[serde(default = "default_pilot_heartbeat_file")]
    pub pilot_heartbeat_file: PathBuf,

    /// Append-only measurement and error journal
    #[serde(default = "default_journal_file")]
    pub journal_file: PathBuf,
}

fn default_kill_instruction_filename() -> String {
    "pilot_kill_payload".to_string()
}

fn default_pilot_heartbeat_file() -> PathBuf {
    PathBuf::from("pilot_heartbeat.json")
}

fn default_journal_file() -> PathBuf {
    PathBuf::from("pilot_journal.jsonl")
}

impl Default for PilotSection {
    fn default() -> Self {
        Self {
            heartbeat: None,
            debug_heartbeat: None,
            lost_heartbeat: None,
            free_space_limit: None,
            free_space_limit_running: None,
            maximum_output_file_size: None,
            maximum_input_file_sizes: None,
            looping_verification_time: None,
            looping_limit_default: None,
            kill_instruction_interval: None,
            kill_instruction_time: None,
            kill_instruction_filename: default_kill_instruction_filename(),
            memory_limits: None,
            disk_check_interval: None,
            memory_check_interval: None,
            process_check_interval: None,
            output_check_interval: None,
            thread_check_interval: None,
            cpu_check_interval: None,
            probe_timeout: None,
            kill_grace_period: None,
            tick_interval: None,
            suspension_limit: None,
            pilot_heartbeat_file: default_pilot_heartbeat_file(),
            journal_file: default_journal_file(),
        }
    }
}

/// `payload` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PayloadSection {
    /// Files under the work directory matching these names count as payload output
    #[serde(default)]
    pub output_files: Vec<String>,
}

/// `token` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenSection {
    /// Proxy or token file whose modification time marks the last renewal
    pub proxy_file: Option<PathBuf>,
    /// Lifetime granted by each renewal
    pub proxy_lifetime: Option<ConfigValue>,
    pub proxy_verification_time: Option<ConfigValue>,
    pub proxy_check_interval: Option<ConfigValue>,
    pub token_refresh_period: Option<ConfigValue>,
}

/// `harvester` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HarvesterSection {
    /// Spool file the heartbeat message is written to
    pub heartbeat_message: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: PassthroughSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stdout)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable stdout logging
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}
