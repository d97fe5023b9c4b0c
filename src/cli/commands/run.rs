//! Implementation of the `pilot-watchdog run` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::{HostProbeFactory, JobSpec, PilotAgent, default_heartbeat_spool};
use crate::cli::output::{CommandOutput, format_bytes, list_table, output};
use crate::domain::models::{ConfigValue, JobState, LifecycleStatus};
use crate::domain::ports::PayloadCommand;
use crate::infrastructure::config::{ConfigLoader, units};
use crate::infrastructure::heartbeat::{PilotHeartbeatFile, SpoolHeartbeatSender};
use crate::infrastructure::journal::JobJournal;
use crate::infrastructure::logging::LoggerImpl;
use crate::infrastructure::process::ProcessLauncher;

/// Exit code when a job was killed by the monitor.
pub const EXIT_TERMINATED: i32 = 70;
/// Exit code when a job survived every kill attempt.
pub const EXIT_KILL_FAILED: i32 = 71;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file
    #[arg(short, long, env = "PILOT_CONFIG", default_value = "config/default.yaml")]
    pub config: PathBuf,

    /// Work directory of the payload
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// Job identifier (generated when omitted)
    #[arg(long)]
    pub job_id: Option<String>,

    /// Resource class used to pick the memory ceiling
    #[arg(short, long, default_value = "SCORE")]
    pub resource_class: String,

    /// Pilot identifier reported with every heartbeat
    #[arg(long, env = "PILOT_ID")]
    pub pilot_id: Option<String>,

    /// Report heartbeats at the debug cadence
    #[arg(long)]
    pub debug: bool,

    /// Total size of the staged input, e.g. "12 GB"
    #[arg(long)]
    pub input_size: Option<String>,

    /// Payload command and its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Final record of one job.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub resource_class: String,
    pub status: LifecycleStatus,
    pub exit_code: Option<i32>,
    pub error_kind: Option<String>,
    pub diagnostic: Option<String>,
    pub disk_used: Option<u64>,
    pub memory_used: Option<u64>,
}

impl From<&JobState> for JobSummary {
    fn from(state: &JobState) -> Self {
        Self {
            job_id: state.id.clone(),
            resource_class: state.resource_class.clone(),
            status: state.lifecycle_status,
            exit_code: state.exit_code,
            error_kind: state.pending_error.as_ref().map(|e| e.kind.to_string()),
            diagnostic: state.pending_error.as_ref().map(|e| e.diagnostic.clone()),
            disk_used: state.current_disk_used,
            memory_used: state.current_memory_used,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub jobs: Vec<JobSummary>,
}

impl RunOutput {
    /// Process exit code summarizing every job; the worst outcome wins.
    pub fn exit_code(&self) -> i32 {
        self.jobs
            .iter()
            .map(|job| match job.status {
                LifecycleStatus::Failed => EXIT_KILL_FAILED,
                LifecycleStatus::Terminated => EXIT_TERMINATED,
                _ => job.exit_code.unwrap_or(1),
            })
            .max()
            .unwrap_or(0)
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["job", "status", "exit", "error", "disk", "memory"]);
        for job in &self.jobs {
            table.add_row(vec![
                job.job_id.clone(),
                job.status.to_string(),
                job.exit_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                job.error_kind.clone().unwrap_or_else(|| "-".to_string()),
                job.disk_used.map_or_else(|| "-".to_string(), format_bytes),
                job.memory_used.map_or_else(|| "-".to_string(), format_bytes),
            ]);
        }

        let mut lines = vec![table.to_string()];
        for job in &self.jobs {
            if let Some(diagnostic) = &job.diagnostic {
                lines.push(format!("{}: {diagnostic}", job.job_id));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Returns the process exit code for the finished jobs.
pub async fn execute(args: RunArgs, json_mode: bool) -> Result<i32> {
    let (config, registry) = ConfigLoader::load_registry(&args.config)?;
    let proxy = ConfigLoader::proxy_settings(&config)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let Some((program, program_args)) = args.command.split_first() else {
        bail!("no payload command given");
    };
    let workdir = std::fs::canonicalize(&args.workdir)
        .with_context(|| format!("work directory {} not found", args.workdir.display()))?;

    let input_size = args
        .input_size
        .as_deref()
        .map(|size| units::byte_size("--input-size", &ConfigValue::text(size)))
        .transpose()?;

    let pilot_file_path = resolve(&workdir, &config.pilot.pilot_heartbeat_file);
    let spool = config
        .harvester
        .heartbeat_message
        .as_deref()
        .map_or_else(|| default_heartbeat_spool(&workdir), |p| resolve(&workdir, p));
    let journal_path = resolve(&workdir, &config.pilot.journal_file);
    let journal = JobJournal::open(&journal_path).await?;
    let pilot_file = PilotHeartbeatFile::new(pilot_file_path.clone());

    let probes = HostProbeFactory {
        output_files: config.payload.output_files.clone(),
        proxy,
        kill_instruction_filename: registry.kill_instruction_filename.clone(),
        watchdog_files: vec![pilot_file_path, spool.clone(), journal_path],
    };
    let sender = SpoolHeartbeatSender::new(spool).with_pilot_file(pilot_file.clone());
    let pilot_id = args
        .pilot_id
        .unwrap_or_else(|| format!("pilot-{}", Uuid::new_v4()));

    let mut agent = PilotAgent::new(
        pilot_id,
        Arc::new(registry),
        Arc::new(ProcessLauncher::new()),
        Arc::new(probes),
        Arc::new(sender),
    )
    .with_pilot_file(pilot_file)
    .with_journal(journal);

    agent
        .start_job(JobSpec {
            job_id: args.job_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            resource_class: args.resource_class,
            debug_mode: args.debug,
            command: PayloadCommand {
                program: program.clone(),
                args: program_args.to_vec(),
                workdir,
            },
            input_size,
        })
        .await?;

    let signals = tokio::spawn(forward_signals(agent.stop_handle()));
    let finished = agent.wait_all().await;
    signals.abort();

    let out = RunOutput {
        jobs: finished?.iter().map(JobSummary::from).collect(),
    };
    output(&out, json_mode);
    Ok(out.exit_code())
}

/// Relative paths in the configuration are taken from the work directory.
fn resolve(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

/// Turn termination signals into an external stop of every job.
async fn forward_signals(stop: broadcast::Sender<String>) {
    let kinds = [
        ("SIGTERM", SignalKind::terminate()),
        ("SIGINT", SignalKind::interrupt()),
        ("SIGQUIT", SignalKind::quit()),
        ("SIGUSR1", SignalKind::user_defined1()),
    ];

    let mut streams = Vec::with_capacity(kinds.len());
    for (name, kind) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((name, stream)),
            Err(e) => warn!(signal = name, error = %e, "cannot listen for signal"),
        }
    }
    if streams.is_empty() {
        return;
    }

    let received = futures::future::select_all(
        streams
            .iter_mut()
            .map(|(name, stream)| Box::pin(async move { stream.recv().await.map(|()| *name) })),
    )
    .await
    .0;

    if let Some(name) = received {
        info!(signal = name, "stopping all jobs");
        let _ = stop.send(format!("pilot received {name}"));
    }
}
