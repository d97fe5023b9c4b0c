//! Implementation of the `pilot-watchdog thresholds` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{CommandOutput, format_bytes, list_table, output};
use crate::domain::models::{MemoryLimit, ThresholdRegistry};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ThresholdsArgs {
    /// Configuration file
    #[arg(short, long, env = "PILOT_CONFIG", default_value = "config/default.yaml")]
    pub config: PathBuf,
}

/// One normalized threshold.
#[derive(Debug, Serialize)]
pub struct ThresholdRow {
    pub name: String,
    pub display: String,
    /// Seconds for durations, bytes for sizes, `null` when unbounded
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ThresholdsOutput {
    pub config: PathBuf,
    pub thresholds: Vec<ThresholdRow>,
}

impl ThresholdsOutput {
    pub fn from_registry(config: PathBuf, registry: &ThresholdRegistry) -> Self {
        let intervals = &registry.check_intervals;
        let mut thresholds = vec![
            duration_row("heartbeat", registry.heartbeat_period),
            duration_row("debug_heartbeat", registry.debug_heartbeat_period),
            duration_row("lost_heartbeat", registry.lost_heartbeat_timeout),
            bytes_row("free_space_limit", registry.free_space_floor),
            bytes_row("free_space_limit_running", registry.free_space_floor_running),
            bytes_row("maximum_output_file_size", registry.max_output_file_size),
            bytes_row("maximum_input_file_sizes", registry.max_input_file_total),
            duration_row("looping_verification_time", registry.looping_verification_window),
            duration_row("looping_limit_default", registry.looping_limit),
            duration_row("kill_instruction_interval", registry.kill_instruction_poll_interval),
            duration_row("kill_instruction_time", registry.kill_instruction_time),
            duration_row("proxy_verification_time", registry.proxy_verification_time),
            duration_row("proxy_check_interval", registry.proxy_check_interval),
            duration_row("token_refresh_period", registry.token_refresh_period),
            duration_row("disk_check_interval", intervals.disk),
            duration_row("memory_check_interval", intervals.memory),
            duration_row("process_check_interval", intervals.process),
            duration_row("output_check_interval", intervals.output),
            duration_row("thread_check_interval", intervals.thread),
            duration_row("cpu_check_interval", intervals.cpu),
            duration_row("probe_timeout", registry.probe_timeout),
            duration_row("kill_grace_period", registry.kill_grace_period),
            duration_row("tick_interval", registry.tick_interval),
            duration_row("suspension_limit", registry.suspension_limit),
        ];

        for (class, limit) in &registry.memory_limits {
            let name = format!("memory_limits.{class}");
            thresholds.push(match limit {
                MemoryLimit::Bounded(bytes) => bytes_row(&name, *bytes),
                MemoryLimit::Unbounded => ThresholdRow {
                    name,
                    display: "unbounded".to_string(),
                    value: serde_json::Value::Null,
                },
            });
        }

        Self { config, thresholds }
    }
}

fn duration_row(name: &str, value: Duration) -> ThresholdRow {
    ThresholdRow {
        name: name.to_string(),
        display: humantime::format_duration(value).to_string(),
        value: serde_json::json!(value.as_secs_f64()),
    }
}

fn bytes_row(name: &str, value: u64) -> ThresholdRow {
    ThresholdRow {
        name: name.to_string(),
        display: format_bytes(value),
        value: serde_json::json!(value),
    }
}

impl CommandOutput for ThresholdsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["threshold", "value"]);
        for row in &self.thresholds {
            table.add_row(vec![row.name.clone(), row.display.clone()]);
        }
        format!("Thresholds from {}:\n{table}", self.config.display())
    }

    fn to_json(&self) -> serde_json::Value {
        let values: serde_json::Map<String, serde_json::Value> = self
            .thresholds
            .iter()
            .map(|row| (row.name.clone(), row.value.clone()))
            .collect();
        serde_json::json!({
            "config": self.config,
            "thresholds": values,
        })
    }
}

pub async fn execute(args: ThresholdsArgs, json_mode: bool) -> Result<()> {
    let (_, registry) = ConfigLoader::load_registry(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    output(&ThresholdsOutput::from_registry(args.config, &registry), json_mode);
    Ok(())
}
