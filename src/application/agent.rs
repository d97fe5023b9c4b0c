//! Pilot agent: launches payloads and supervises one monitor per job.
//!
//! Jobs are isolated from each other. Each gets its own [`JobState`],
//! check schedule and monitor task; they share only the read-only
//! [`ThresholdRegistry`] and the stop channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::errors::LaunchError;
use crate::domain::models::{JobState, ThresholdRegistry};
use crate::domain::ports::{HeartbeatSender, JobLauncher, PayloadCommand, ProxyInspector};
use crate::infrastructure::config::ProxySettings;
use crate::infrastructure::heartbeat::PilotHeartbeatFile;
use crate::infrastructure::journal::{JobJournal, JournalEntry, JournalEvent};
use crate::infrastructure::probes::{KillFile, NoProxy, ProxyFile, SystemProbe};
use crate::services::{Check, Probes};

use super::heartbeat_reporter::HeartbeatReporter;
use super::job_monitor::JobMonitor;

/// Builds the probes for a freshly launched payload.
pub trait ProbeFactory: Send + Sync {
    fn probes(&self, pid: Option<u32>, workdir: &Path) -> Result<Probes>;
}

/// Probes backed by the local host.
pub struct HostProbeFactory {
    pub output_files: Vec<String>,
    pub proxy: Option<ProxySettings>,
    pub kill_instruction_filename: String,
    /// Journal, heartbeat and spool files the watchdog writes itself
    pub watchdog_files: Vec<PathBuf>,
}

impl HostProbeFactory {
    /// Files under `workdir` that change without any payload activity.
    pub fn ignored_files(&self, workdir: &Path) -> Vec<PathBuf> {
        let mut ignored = vec![workdir.join(&self.kill_instruction_filename)];
        for path in &self.watchdog_files {
            ignored.push(path.clone());
            // Heartbeat and spool files are replaced through a sibling temp file.
            ignored.push(path.with_extension("tmp"));
        }
        ignored
    }
}

impl ProbeFactory for HostProbeFactory {
    fn probes(&self, pid: Option<u32>, workdir: &Path) -> Result<Probes> {
        let pid = pid.context("payload has no process id to probe")?;

        let proxy: Arc<dyn ProxyInspector> = match &self.proxy {
            Some(settings) => Arc::new(ProxyFile::new(&settings.file, settings.lifetime)),
            None => Arc::new(NoProxy),
        };

        Ok(Probes {
            resources: Arc::new(
                SystemProbe::new(workdir, pid, self.output_files.clone())
                    .with_ignored(self.ignored_files(workdir)),
            ),
            proxy,
            kill_instructions: Arc::new(KillFile::new(workdir, &self.kill_instruction_filename)),
        })
    }
}

/// One job to run.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub resource_class: String,
    pub debug_mode: bool,
    pub command: PayloadCommand,
    /// Total size of the staged input files, checked before launch
    pub input_size: Option<u64>,
}

pub struct PilotAgent {
    pilot_id: String,
    registry: Arc<ThresholdRegistry>,
    launcher: Arc<dyn JobLauncher>,
    probes: Arc<dyn ProbeFactory>,
    heartbeat_sender: Arc<dyn HeartbeatSender>,
    pilot_file: Option<PilotHeartbeatFile>,
    journal: Option<JobJournal>,
    stop_tx: broadcast::Sender<String>,
    jobs: Vec<(String, JoinHandle<Result<JobState>>)>,
}

impl PilotAgent {
    pub fn new(
        pilot_id: impl Into<String>,
        registry: Arc<ThresholdRegistry>,
        launcher: Arc<dyn JobLauncher>,
        probes: Arc<dyn ProbeFactory>,
        heartbeat_sender: Arc<dyn HeartbeatSender>,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(4);
        Self {
            pilot_id: pilot_id.into(),
            registry,
            launcher,
            probes,
            heartbeat_sender,
            pilot_file: None,
            journal: None,
            stop_tx,
            jobs: Vec::new(),
        }
    }

    pub fn with_pilot_file(mut self, pilot_file: PilotHeartbeatFile) -> Self {
        self.pilot_file = Some(pilot_file);
        self
    }

    pub fn with_journal(mut self, journal: JobJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn registry(&self) -> &Arc<ThresholdRegistry> {
        &self.registry
    }

    /// Sender that stops every job when it receives a reason.
    pub fn stop_handle(&self) -> broadcast::Sender<String> {
        self.stop_tx.clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Launch a payload and start monitoring it.
    pub async fn start_job(&mut self, spec: JobSpec) -> Result<()> {
        if let Some(total) = spec.input_size {
            if !self.registry.input_total_allowed(total) {
                return Err(LaunchError::InputTooLarge {
                    total,
                    limit: self.registry.max_input_file_total,
                })
                .with_context(|| format!("job {} not started", spec.job_id));
            }
        }

        let payload = self
            .launcher
            .launch(&spec.command)
            .await
            .with_context(|| format!("failed to launch job {}", spec.job_id))?;
        let pid = payload.control.pid();

        let probes = match self.probes.probes(pid, &spec.command.workdir) {
            Ok(probes) => probes,
            Err(e) => {
                error!(job_id = %spec.job_id, error = %e, "no probes for payload, killing it");
                let _ = payload.control.force_kill().await;
                return Err(e.context(format!("failed to probe job {}", spec.job_id)));
            }
        };

        let state = JobState::new(&spec.job_id, &spec.resource_class, Utc::now())
            .with_debug_mode(spec.debug_mode);

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(&JournalEntry::new(
                spec.job_id.clone(),
                state.start_time,
                JournalEvent::Started {
                    pid,
                    resource_class: spec.resource_class.clone(),
                },
            )) {
                warn!(job_id = %spec.job_id, error = %e, "failed to journal job start");
            }
        }

        let reporter = HeartbeatReporter::new(
            Arc::clone(&self.heartbeat_sender),
            spec.job_id.clone(),
            self.pilot_id.clone(),
            self.registry.effective_heartbeat_period(spec.debug_mode),
        );

        let mut monitor = JobMonitor::new(
            state,
            payload,
            Check::standard_set(&probes),
            Arc::clone(&self.registry),
        )
        .with_reporter(reporter);
        if let Some(pilot_file) = &self.pilot_file {
            monitor = monitor.with_pilot_file(pilot_file.clone());
        }
        if let Some(journal) = &self.journal {
            monitor = monitor.with_journal(journal.clone());
        }

        let stop = self.stop_tx.subscribe();
        let handle = tokio::spawn(monitor.run(stop));
        info!(job_id = %spec.job_id, pid = ?pid, debug = spec.debug_mode, "job started");

        self.jobs.push((spec.job_id, handle));
        Ok(())
    }

    /// Ask every running job to terminate. Returns how many monitors were reached.
    pub fn stop_all(&self, reason: impl Into<String>) -> usize {
        self.stop_tx.send(reason.into()).unwrap_or(0)
    }

    /// Wait for every job to reach a terminal status.
    pub async fn wait_all(self) -> Result<Vec<JobState>> {
        let mut finished = Vec::with_capacity(self.jobs.len());
        for (job_id, handle) in self.jobs {
            let state = handle
                .await
                .with_context(|| format!("monitor task for job {job_id} panicked"))?
                .with_context(|| format!("monitor for job {job_id} failed"))?;
            finished.push(state);
        }
        Ok(finished)
    }
}

/// Default spool location when the harvester section names none.
pub fn default_heartbeat_spool(workdir: &Path) -> PathBuf {
    workdir.join("worker_heartbeat.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::heartbeat::HeartbeatStamp;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_host_probes_ignore_watchdog_files() {
        let dir = TempDir::new().unwrap();
        let workdir = dir.path();

        let output = workdir.join("payload.out");
        std::fs::write(&output, b"event 1\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&output)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let journal_path = workdir.join("pilot_journal.jsonl");
        let pilot_path = workdir.join("pilot_heartbeat.json");
        let spool = default_heartbeat_spool(workdir);
        let factory = HostProbeFactory {
            output_files: Vec::new(),
            proxy: None,
            kill_instruction_filename: "pilot_kill_payload".to_string(),
            watchdog_files: vec![pilot_path.clone(), spool.clone(), journal_path.clone()],
        };

        let state = JobState::new("1", "SCORE", Utc::now());
        JobJournal::open(&journal_path)
            .await
            .unwrap()
            .record(&JournalEntry::measurement(&state, Utc::now()))
            .unwrap();
        PilotHeartbeatFile::new(&pilot_path)
            .stamp(HeartbeatStamp::Pilot, Utc::now())
            .await
            .unwrap();
        std::fs::write(&spool, b"{}").unwrap();
        std::fs::write(workdir.join("pilot_kill_payload"), b"").unwrap();

        let probes = factory.probes(Some(std::process::id()), workdir).unwrap();
        let activity = probes.resources.output_activity().await.unwrap();
        let stale = Utc::now() - chrono::Duration::minutes(30);
        assert!(activity.last_modified.unwrap() < stale);
    }

    #[test]
    fn test_ignored_files_include_temp_siblings_and_kill_file() {
        let workdir = Path::new("/work");
        let factory = HostProbeFactory {
            output_files: Vec::new(),
            proxy: None,
            kill_instruction_filename: "pilot_kill_payload".to_string(),
            watchdog_files: vec![PathBuf::from("/work/pilot_heartbeat.json")],
        };

        let ignored = factory.ignored_files(workdir);
        assert!(ignored.contains(&PathBuf::from("/work/pilot_kill_payload")));
        assert!(ignored.contains(&PathBuf::from("/work/pilot_heartbeat.json")));
        assert!(ignored.contains(&PathBuf::from("/work/pilot_heartbeat.tmp")));
    }
}
