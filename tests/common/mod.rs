//! Common test utilities for integration tests
//!
//! Scriptable stand-ins for the probes, the payload process and the
//! heartbeat channel, shared across the integration test files.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use pilot_watchdog::application::ProbeFactory;
use pilot_watchdog::domain::errors::{ControlError, LaunchError, ProbeError, WatchdogResult};
use pilot_watchdog::domain::models::ThresholdRegistry;
use pilot_watchdog::domain::ports::{
    DiskUsage, HeartbeatAck, HeartbeatMessage, HeartbeatSender, JobLauncher, KillInstruction,
    KillInstructionSource, LaunchedPayload, OutputActivity, PayloadCommand, PayloadControl,
    PayloadExit, ProxyInspector, ResourceProbe,
};
use pilot_watchdog::services::Probes;

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Values reported by [`MockProbe`].
#[derive(Debug, Clone)]
pub struct ProbeValues {
    pub disk: DiskUsage,
    pub memory: u64,
    pub cpu: f32,
    pub output: OutputActivity,
    /// Delay before every disk sample
    pub disk_delay: Option<Duration>,
}

impl Default for ProbeValues {
    fn default() -> Self {
        Self {
            disk: DiskUsage {
                available: 100 * GB,
                used: Some(GB),
            },
            memory: 100 * MB,
            cpu: 50.0,
            output: OutputActivity {
                last_modified: Some(Utc::now()),
                largest_file: MB,
            },
            disk_delay: None,
        }
    }
}

/// Resource probe returning whatever the test last set.
#[derive(Default)]
pub struct MockProbe {
    values: Mutex<ProbeValues>,
}

impl MockProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(&self, f: impl FnOnce(&mut ProbeValues)) {
        f(&mut self.values.lock().unwrap());
    }

    fn values(&self) -> ProbeValues {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceProbe for MockProbe {
    async fn disk_usage(&self) -> Result<DiskUsage, ProbeError> {
        let values = self.values();
        if let Some(delay) = values.disk_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(values.disk)
    }

    async fn memory_used(&self) -> Result<u64, ProbeError> {
        Ok(self.values().memory)
    }

    async fn cpu_used(&self) -> Result<f32, ProbeError> {
        Ok(self.values().cpu)
    }

    async fn output_activity(&self) -> Result<OutputActivity, ProbeError> {
        Ok(self.values().output)
    }
}

/// Proxy with a fixed remaining validity.
#[derive(Default)]
pub struct MockProxy {
    pub remaining: Mutex<Option<Duration>>,
}

#[async_trait]
impl ProxyInspector for MockProxy {
    async fn remaining_validity(&self) -> Result<Option<Duration>, ProbeError> {
        Ok(*self.remaining.lock().unwrap())
    }
}

/// Kill instruction source the test can drop an instruction into.
#[derive(Default)]
pub struct MockKillSource {
    pub instruction: Mutex<Option<KillInstruction>>,
}

impl MockKillSource {
    pub fn drop_instruction(&self, issued_at: DateTime<Utc>) {
        *self.instruction.lock().unwrap() = Some(KillInstruction {
            issued_at,
            note: Some("operator request".to_string()),
        });
    }
}

#[async_trait]
impl KillInstructionSource for MockKillSource {
    async fn instruction(&self) -> Result<Option<KillInstruction>, ProbeError> {
        Ok(self.instruction.lock().unwrap().clone())
    }
}

/// Probes plus handles to the mocks behind them.
pub struct MockProbes {
    pub resources: Arc<MockProbe>,
    pub proxy: Arc<MockProxy>,
    pub kill: Arc<MockKillSource>,
}

impl MockProbes {
    pub fn healthy() -> Self {
        Self {
            resources: MockProbe::new(),
            proxy: Arc::new(MockProxy::default()),
            kill: Arc::new(MockKillSource::default()),
        }
    }

    pub fn probes(&self) -> Probes {
        Probes {
            resources: self.resources.clone(),
            proxy: self.proxy.clone(),
            kill_instructions: self.kill.clone(),
        }
    }
}

/// Hands out the same probes for every job.
pub struct StaticProbeFactory(pub Probes);

impl ProbeFactory for StaticProbeFactory {
    fn probes(&self, _pid: Option<u32>, _workdir: &Path) -> anyhow::Result<Probes> {
        Ok(self.0.clone())
    }
}

/// Which signal makes the mock payload exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOn {
    Terminate,
    ForceKill,
    Never,
}

/// Payload stand-in that counts signals and exits on cue.
pub struct MockControl {
    pub terminates: AtomicUsize,
    pub force_kills: AtomicUsize,
    exit_on: ExitOn,
    exit_tx: watch::Sender<Option<PayloadExit>>,
}

impl MockControl {
    pub fn new(exit_on: ExitOn) -> (Arc<Self>, watch::Receiver<Option<PayloadExit>>) {
        let (exit_tx, exit_rx) = watch::channel(None);
        let control = Arc::new(Self {
            terminates: AtomicUsize::new(0),
            force_kills: AtomicUsize::new(0),
            exit_on,
            exit_tx,
        });
        (control, exit_rx)
    }

    /// A launched payload backed by a fresh mock.
    pub fn launched(exit_on: ExitOn) -> (Arc<Self>, LaunchedPayload) {
        let (control, exit) = Self::new(exit_on);
        let payload = LaunchedPayload {
            control: control.clone(),
            exit,
        };
        (control, payload)
    }

    /// The payload finishes on its own.
    pub fn exit(&self, code: Option<i32>) {
        self.exit_tx.send_replace(Some(PayloadExit {
            code,
            exited_at: Utc::now(),
        }));
    }

    pub fn terminate_count(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }

    pub fn force_kill_count(&self) -> usize {
        self.force_kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayloadControl for MockControl {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn terminate(&self) -> Result<(), ControlError> {
        self.terminates.fetch_add(1, Ordering::SeqCst);
        if self.exit_on == ExitOn::Terminate {
            self.exit(None);
        }
        Ok(())
    }

    async fn force_kill(&self) -> Result<(), ControlError> {
        self.force_kills.fetch_add(1, Ordering::SeqCst);
        if self.exit_on == ExitOn::ForceKill {
            self.exit(None);
        }
        Ok(())
    }
}

/// Launcher producing [`MockControl`] payloads.
pub struct MockLauncher {
    exit_on: ExitOn,
    pub launched: Mutex<Vec<(PayloadCommand, Arc<MockControl>)>>,
}

impl MockLauncher {
    pub fn new(exit_on: ExitOn) -> Arc<Self> {
        Arc::new(Self {
            exit_on,
            launched: Mutex::new(Vec::new()),
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn control(&self, index: usize) -> Arc<MockControl> {
        self.launched.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl JobLauncher for MockLauncher {
    async fn launch(&self, command: &PayloadCommand) -> Result<LaunchedPayload, LaunchError> {
        if command.program.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        let (control, payload) = MockControl::launched(self.exit_on);
        self.launched
            .lock()
            .unwrap()
            .push((command.clone(), control));
        Ok(payload)
    }
}

/// Heartbeat sender that records every message and acknowledges it.
#[derive(Default)]
pub struct RecordingSender {
    pub messages: Mutex<Vec<HeartbeatMessage>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<pilot_watchdog::LifecycleStatus> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.status)
            .collect()
    }

    pub fn last(&self) -> Option<HeartbeatMessage> {
        self.messages.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HeartbeatSender for RecordingSender {
    async fn send(&self, message: &HeartbeatMessage) -> WatchdogResult<HeartbeatAck> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(HeartbeatAck {
            acked_at: Utc::now(),
        })
    }
}

/// Reference thresholds with a short kill grace period.
pub fn registry() -> ThresholdRegistry {
    ThresholdRegistry {
        kill_grace_period: Duration::from_secs(5),
        ..ThresholdRegistry::reference()
    }
}

pub fn command(program: &str) -> PayloadCommand {
    PayloadCommand {
        program: program.to_string(),
        args: Vec::new(),
        workdir: std::env::temp_dir(),
    }
}
