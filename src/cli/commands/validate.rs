//! Implementation of the `pilot-watchdog validate` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{CommandOutput, output};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file
    #[arg(short, long, env = "PILOT_CONFIG", default_value = "config/default.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub valid: bool,
    pub config: PathBuf,
    pub resource_classes: Vec<String>,
    pub proxy_monitored: bool,
    pub shortest_interval_secs: f64,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Configuration {} is valid.", self.config.display())];
        lines.push(format!(
            "  Resource classes: {}",
            if self.resource_classes.is_empty() {
                "none".to_string()
            } else {
                self.resource_classes.join(", ")
            }
        ));
        lines.push(format!(
            "  Proxy monitoring: {}",
            if self.proxy_monitored { "enabled" } else { "disabled" }
        ));
        lines.push(format!("  Shortest check interval: {}s", self.shortest_interval_secs));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Fails with the first configuration problem found.
pub async fn execute(args: ValidateArgs, json_mode: bool) -> Result<()> {
    let (config, registry) = ConfigLoader::load_registry(&args.config)?;
    let proxy = ConfigLoader::proxy_settings(&config)?;

    let out = ValidateOutput {
        valid: true,
        config: args.config,
        resource_classes: registry.memory_limits.keys().cloned().collect(),
        proxy_monitored: proxy.is_some(),
        shortest_interval_secs: registry.check_intervals.min().as_secs_f64(),
    };
    output(&out, json_mode);
    Ok(())
}
