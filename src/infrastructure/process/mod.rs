//! Payload process adapter
//!
//! Starts the payload as a child in its own process group so signals reach
//! every process it spawned. The child is reaped by a background task that
//! publishes the exit on a watch channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::errors::{ControlError, LaunchError};
use crate::domain::ports::{
    JobLauncher, LaunchedPayload, PayloadCommand, PayloadControl, PayloadExit,
};

/// Launches payloads as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn launch(&self, command: &PayloadCommand) -> Result<LaunchedPayload, LaunchError> {
        if command.program.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.workdir)
            .process_group(0)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: command.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(pid = ?pid, program = %command.program, workdir = %command.workdir.display(), "payload started");

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "failed to wait for payload");
                    None
                }
            };
            debug!(pid = ?pid, code = ?code, "payload reaped");
            let _ = exit_tx.send(Some(PayloadExit {
                code,
                exited_at: Utc::now(),
            }));
        });

        Ok(LaunchedPayload {
            control: Arc::new(ProcessControl {
                pid,
                exit: exit_rx.clone(),
            }),
            exit: exit_rx,
        })
    }
}

/// Signals the payload's process group.
pub struct ProcessControl {
    pid: Option<u32>,
    exit: watch::Receiver<Option<PayloadExit>>,
}

impl ProcessControl {
    fn signal(&self, signal: Signal) -> Result<(), ControlError> {
        // A reaped group id may already belong to someone else.
        if self.exit.borrow().is_some() {
            debug!(pid = ?self.pid, %signal, "payload already exited, not signalling");
            return Ok(());
        }

        let pid = self.pid.ok_or(ControlError::NoProcess)?;
        let raw = i32::try_from(pid).map_err(|_| ControlError::Signal {
            pid: -1,
            reason: format!("pid {pid} out of range"),
        })?;

        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => {
                debug!(pid = raw, %signal, "signal delivered");
                Ok(())
            }
            Err(errno) => Err(ControlError::Signal {
                pid: raw,
                reason: errno.desc().to_string(),
            }),
        }
    }
}

#[async_trait]
impl PayloadControl for ProcessControl {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn terminate(&self) -> Result<(), ControlError> {
        self.signal(Signal::SIGTERM)
    }

    async fn force_kill(&self) -> Result<(), ControlError> {
        self.signal(Signal::SIGKILL)
    }
}
