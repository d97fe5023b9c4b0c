//! Command-line interface

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use crate::domain::errors::LaunchError;
use crate::infrastructure::config::ConfigError;

/// Exit code for any failure without a more specific code.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a payload that could not be started.
pub const EXIT_LAUNCH_FAILED: i32 = 69;
/// Exit code for an invalid or missing configuration.
pub const EXIT_CONFIG: i32 = 78;

/// Exit code for an error, chosen from the first recognized cause in its chain.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return EXIT_CONFIG;
        }
        if cause.is::<LaunchError>() {
            return EXIT_LAUNCH_FAILED;
        }
    }
    EXIT_FAILURE
}

/// Report `err` and exit the process.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = exit_code(&err);
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
            "exit_code": code,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(code)
}
