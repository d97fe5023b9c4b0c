//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use super::commands::run::RunArgs;
use super::commands::thresholds::ThresholdsArgs;
use super::commands::validate::ValidateArgs;

#[derive(Parser)]
#[command(name = "pilot-watchdog")]
#[command(about = "Monitors grid payloads and enforces their resource limits", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a payload and monitor it until it finishes
    Run(RunArgs),

    /// Show the thresholds the monitor would enforce
    Thresholds(ThresholdsArgs),

    /// Check a configuration file without running anything
    Validate(ValidateArgs),
}
