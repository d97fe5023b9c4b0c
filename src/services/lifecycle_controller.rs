//! Lifecycle controller.
//!
//! Owns the [`JobState`] of one job and is the only place its lifecycle
//! status changes. Decisions from the aggregator, payload exit notifications
//! and heartbeat acknowledgements are all applied here, one at a time.
//!
//! Entering `Killing` is a one-way latch: the graceful kill is issued at most
//! once per job, after which a bounded grace period runs. A payload still
//! alive after the grace period gets a single forced kill and one more grace
//! period; if it survives that too the job ends `Failed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{WatchdogError, WatchdogResult};
use crate::domain::models::{
    ErrorKind, JobState, LifecycleDecision, LifecycleStatus, PendingError, Verdict,
};
use crate::domain::ports::{PayloadControl, PayloadExit};

pub struct LifecycleController {
    state: JobState,
    payload: Arc<dyn PayloadControl>,
    grace: Duration,
    kill_issued: bool,
    force_kill_issued: bool,
    /// Caller's clock when the kill was issued, plus the matching monotonic instant
    killing_since: Option<(DateTime<Utc>, Instant)>,
}

impl LifecycleController {
    pub fn new(state: JobState, payload: Arc<dyn PayloadControl>, grace: Duration) -> Self {
        Self {
            state,
            payload,
            grace,
            kill_issued: false,
            force_kill_issued: false,
            killing_since: None,
        }
    }

    pub const fn state(&self) -> &JobState {
        &self.state
    }

    pub const fn status(&self) -> LifecycleStatus {
        self.state.lifecycle_status
    }

    pub const fn pending_error(&self) -> Option<&PendingError> {
        self.state.pending_error.as_ref()
    }

    pub const fn kill_issued(&self) -> bool {
        self.kill_issued
    }

    /// Consume the controller, returning the final job record.
    pub fn into_state(self) -> JobState {
        self.state
    }

    /// Fold the samples carried by a tick's verdicts into the job record.
    pub fn record_observations(&mut self, verdicts: &[Verdict], now: DateTime<Utc>) {
        for observation in verdicts.iter().filter_map(|v| v.observation.as_ref()) {
            self.state.record_observation(observation, now);
        }
    }

    pub fn heartbeat_sent(&mut self, at: DateTime<Utc>) {
        self.state.record_heartbeat_sent(at);
    }

    pub fn heartbeat_acked(&mut self, at: DateTime<Utc>) {
        self.state.record_heartbeat_ack(at);
    }

    /// Apply one tick's decision.
    ///
    /// Decisions arriving once the job has left `Running`/`Warning` are
    /// ignored.
    pub async fn apply(
        &mut self,
        decision: &LifecycleDecision,
        now: DateTime<Utc>,
    ) -> WatchdogResult<LifecycleStatus> {
        if !self.status().is_live() {
            debug!(
                job_id = %self.state.id,
                status = %self.status(),
                decision = decision.as_str(),
                "decision ignored, job no longer live"
            );
            return Ok(self.status());
        }

        match decision {
            LifecycleDecision::Idle => {}
            LifecycleDecision::Continue => {
                if self.status() == LifecycleStatus::Warning {
                    self.state.transition_to(LifecycleStatus::Running, now)?;
                    info!(job_id = %self.state.id, "all checks healthy again");
                }
            }
            LifecycleDecision::ContinueWithWarning { warnings } => {
                let reasons: Vec<String> = warnings
                    .iter()
                    .map(|w| format!("{}:{}", w.check, w.reason))
                    .collect();
                if self.status() == LifecycleStatus::Running {
                    self.state.transition_to(LifecycleStatus::Warning, now)?;
                }
                warn!(job_id = %self.state.id, warnings = ?reasons, "job continues with warnings");
            }
            LifecycleDecision::Terminate { cause } => {
                self.begin_kill(cause.clone(), now).await?;
            }
        }

        Ok(self.status())
    }

    /// Enter `Killing` and issue the graceful kill.
    ///
    /// Returns `false` when the kill was already issued; the payload is then
    /// left alone and `cause` is discarded.
    pub async fn begin_kill(
        &mut self,
        cause: PendingError,
        now: DateTime<Utc>,
    ) -> WatchdogResult<bool> {
        if self.kill_issued || !self.status().is_live() {
            debug!(job_id = %self.state.id, cause = %cause, "kill already in progress");
            return Ok(false);
        }

        self.state.transition_to(LifecycleStatus::Killing, now)?;
        self.kill_issued = true;
        self.killing_since = Some((now, Instant::now()));

        warn!(
            job_id = %self.state.id,
            pid = ?self.payload.pid(),
            cause = %cause,
            "terminating payload"
        );
        self.state.pending_error = Some(cause);

        if let Err(e) = self.payload.terminate().await {
            warn!(job_id = %self.state.id, error = %e, "graceful kill failed, escalating");
            self.force_kill().await;
        }

        Ok(true)
    }

    /// Wait for the payload to exit after the kill, escalating once.
    ///
    /// Returns the final status. Does nothing unless the job is `Killing`.
    pub async fn enforce_termination(
        &mut self,
        exit: &mut watch::Receiver<Option<PayloadExit>>,
    ) -> WatchdogResult<LifecycleStatus> {
        if self.status() != LifecycleStatus::Killing {
            return Ok(self.status());
        }

        if !self.force_kill_issued {
            if let Some(exited) = wait_for_exit(exit, self.grace).await {
                return self.payload_exited(exited);
            }
            warn!(
                job_id = %self.state.id,
                grace = ?self.grace,
                "payload still alive after grace period, forcing kill"
            );
            self.force_kill().await;
        }

        if let Some(exited) = wait_for_exit(exit, self.grace).await {
            return self.payload_exited(exited);
        }

        let failure = WatchdogError::KillFailure {
            job_id: self.state.id.clone(),
            grace: self.grace,
        };
        error!(job_id = %self.state.id, error = %failure, "giving up on payload");

        let diagnostic = match self.state.pending_error.take() {
            Some(cause) => format!("{failure} (cause: {cause})"),
            None => failure.to_string(),
        };
        self.state.pending_error = Some(PendingError::new(ErrorKind::KillFailure, diagnostic));
        let failed_at = self.killing_since.map_or(self.state.updated_at, |(at, since)| {
            chrono::Duration::from_std(since.elapsed())
                .ok()
                .and_then(|waited| at.checked_add_signed(waited))
                .unwrap_or(at)
        });
        self.state.transition_to(LifecycleStatus::Failed, failed_at)?;

        Ok(self.status())
    }

    /// The payload process exited.
    ///
    /// A live job completes as `Done`; a job being killed ends `Terminated`
    /// with its recorded cause.
    pub fn payload_exited(&mut self, exited: PayloadExit) -> WatchdogResult<LifecycleStatus> {
        self.state.exit_code = exited.code;

        let next = match self.status() {
            LifecycleStatus::Running | LifecycleStatus::Warning => LifecycleStatus::Done,
            LifecycleStatus::Killing => LifecycleStatus::Terminated,
            terminal => {
                debug!(job_id = %self.state.id, status = %terminal, "exit after terminal status");
                return Ok(terminal);
            }
        };

        self.state.transition_to(next, exited.exited_at)?;
        info!(
            job_id = %self.state.id,
            status = %next,
            exit_code = ?exited.code,
            pending_error = ?self.state.pending_error.as_ref().map(ToString::to_string),
            "payload exited"
        );

        Ok(next)
    }

    async fn force_kill(&mut self) {
        if self.force_kill_issued {
            return;
        }
        self.force_kill_issued = true;

        if let Err(e) = self.payload.force_kill().await {
            warn!(job_id = %self.state.id, error = %e, "forced kill failed");
        }
    }
}

/// Wait up to `grace` for the exit notification.
async fn wait_for_exit(
    exit: &mut watch::Receiver<Option<PayloadExit>>,
    grace: Duration,
) -> Option<PayloadExit> {
    let sender_closed = match tokio::time::timeout(grace, exit.wait_for(Option::is_some)).await {
        Ok(Ok(exited)) => return *exited,
        Ok(Err(_)) => true,
        Err(_) => false,
    };

    // Sender gone without an exit record: nothing left to wait on.
    if sender_closed {
        tokio::time::sleep(grace).await;
    }
    None
}
