//! Pilot watchdog CLI entry point.

use clap::Parser;

use pilot_watchdog::cli::{Cli, Commands, commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.json).await,
        Commands::Thresholds(args) => commands::thresholds::execute(args, cli.json).await.map(|()| 0),
        Commands::Validate(args) => commands::validate::execute(args, cli.json).await.map(|()| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => pilot_watchdog::cli::handle_error(err, cli.json),
    }
}
