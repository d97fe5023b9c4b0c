//! Per-job monitoring loop.
//!
//! One [`JobMonitor`] runs per payload in its own task. It owns the job's
//! [`LifecycleController`], so check results, payload exits, heartbeat
//! acknowledgements and stop requests are applied strictly one at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::models::{
    JobState, LifecycleDecision, LifecycleStatus, ThresholdRegistry, Verdict,
};
use crate::domain::ports::{LaunchedPayload, PayloadExit};
use crate::infrastructure::heartbeat::{HeartbeatStamp, PilotHeartbeatFile};
use crate::infrastructure::journal::{JobJournal, JournalEntry, JournalEvent};
use crate::services::{Check, CheckScheduler, LifecycleController, VerdictAggregator};

use super::heartbeat_reporter::{HeartbeatEvent, HeartbeatReporter, ReportedStatus};

pub struct JobMonitor {
    controller: LifecycleController,
    scheduler: CheckScheduler,
    aggregator: VerdictAggregator,
    registry: Arc<ThresholdRegistry>,
    exit: watch::Receiver<Option<PayloadExit>>,
    reporter: Option<HeartbeatReporter>,
    pilot_file: Option<PilotHeartbeatFile>,
    journal: Option<JobJournal>,
}

impl JobMonitor {
    pub fn new(
        state: JobState,
        payload: LaunchedPayload,
        checks: Vec<Check>,
        registry: Arc<ThresholdRegistry>,
    ) -> Self {
        let scheduler = CheckScheduler::new(checks, &registry, state.start_time);
        let controller =
            LifecycleController::new(state, payload.control, registry.kill_grace_period);

        Self {
            controller,
            scheduler,
            aggregator: VerdictAggregator::new(),
            registry,
            exit: payload.exit,
            reporter: None,
            pilot_file: None,
            journal: None,
        }
    }

    pub fn with_reporter(mut self, reporter: HeartbeatReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_pilot_file(mut self, pilot_file: PilotHeartbeatFile) -> Self {
        self.pilot_file = Some(pilot_file);
        self
    }

    pub fn with_journal(mut self, journal: JobJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn state(&self) -> &JobState {
        self.controller.state()
    }

    /// Run until the job reaches a terminal status and return its final record.
    ///
    /// A message on `stop` terminates the payload with cause `external_stop`.
    pub async fn run(mut self, mut stop: broadcast::Receiver<String>) -> Result<JobState> {
        let job_id = self.state().id.clone();

        let mut tick = tokio::time::interval(self.registry.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut supervise = tokio::time::interval(self.registry.check_intervals.thread);
        supervise.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (status_tx, _) = watch::channel(self.reported());
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (reporter_shutdown, _) = broadcast::channel(1);
        let mut reporter_handle = self.spawn_reporter(&status_tx, &events_tx, &reporter_shutdown);

        let mut exit_closed = false;
        let mut stop_closed = false;

        info!(
            job_id = %job_id,
            resource_class = %self.state().resource_class,
            checks = ?self.scheduler.kinds(),
            "monitoring job"
        );

        loop {
            if self.controller.status() == LifecycleStatus::Killing {
                self.publish(&status_tx);
                self.controller
                    .enforce_termination(&mut self.exit)
                    .await
                    .context("failed to enforce termination")?;
            }
            self.publish(&status_tx);
            if self.controller.state().is_terminal() {
                break;
            }

            tokio::select! {
                _ = tick.tick() => {
                    self.on_tick(Utc::now()).await?;
                }
                changed = self.exit.changed(), if !exit_closed => {
                    if changed.is_err() {
                        warn!(job_id = %job_id, "payload exit channel closed");
                        exit_closed = true;
                        continue;
                    }
                    let exited = *self.exit.borrow_and_update();
                    if let Some(exited) = exited {
                        self.controller.payload_exited(exited)?;
                    }
                }
                Some(event) = events_rx.recv() => {
                    self.on_heartbeat(event);
                }
                reason = stop.recv(), if !stop_closed => {
                    let diagnostic = match reason {
                        Ok(reason) => reason,
                        Err(broadcast::error::RecvError::Lagged(_)) => "stop requested".to_string(),
                        Err(broadcast::error::RecvError::Closed) => {
                            stop_closed = true;
                            continue;
                        }
                    };
                    self.on_stop(diagnostic).await?;
                }
                _ = supervise.tick() => {
                    self.on_supervise(Utc::now()).await;
                    if reporter_handle.as_ref().is_some_and(JoinHandle::is_finished) {
                        warn!(job_id = %job_id, "heartbeat reporter died, respawning");
                        reporter_handle =
                            self.spawn_reporter(&status_tx, &events_tx, &reporter_shutdown);
                    }
                }
            }
        }

        // Let the reporter deliver the terminal status before shutting it down.
        drop(events_tx);
        if let Some(handle) = reporter_handle {
            let wait = self.registry.probe_timeout;
            let drain = async {
                while let Some(event) = events_rx.recv().await {
                    self.on_heartbeat(event);
                }
            };
            let _ = tokio::time::timeout(wait, drain).await;
            let _ = reporter_shutdown.send(());
            drop(events_rx);
            let _ = handle.await;
        }

        let state = self.controller.into_state();
        if let Some(journal) = &self.journal {
            record(journal, &JournalEntry::finished(&state, Utc::now()));
        }
        info!(
            job_id = %state.id,
            status = %state.lifecycle_status,
            exit_code = ?state.exit_code,
            pending_error = ?state.pending_error.as_ref().map(ToString::to_string),
            "job finished"
        );

        Ok(state)
    }

    /// Run the due checks and apply the resulting decision.
    pub async fn on_tick(&mut self, now: DateTime<Utc>) -> Result<LifecycleDecision> {
        let verdicts = self
            .scheduler
            .run_due(self.controller.state(), &self.registry, now)
            .await;
        if verdicts.is_empty() {
            return Ok(LifecycleDecision::Idle);
        }

        self.controller.record_observations(&verdicts, now);
        let decision = self.aggregator.aggregate(&verdicts);

        let before = self.controller.status();
        self.controller
            .apply(&decision, now)
            .await
            .context("failed to apply lifecycle decision")?;

        self.journal_tick(&verdicts, &decision, before, now);
        Ok(decision)
    }

    async fn on_stop(&mut self, diagnostic: String) -> Result<()> {
        warn!(job_id = %self.state().id, reason = %diagnostic, "external stop requested");
        let now = Utc::now();
        let before = self.controller.status();
        let decision = LifecycleDecision::external_stop(diagnostic);
        self.controller.apply(&decision, now).await?;
        self.journal_tick(&[], &decision, before, now);
        Ok(())
    }

    fn on_heartbeat(&mut self, event: HeartbeatEvent) {
        match event {
            HeartbeatEvent::Sent { at } => self.controller.heartbeat_sent(at),
            HeartbeatEvent::Acked { at } => self.controller.heartbeat_acked(at),
            HeartbeatEvent::Failed { at, error } => {
                debug!(job_id = %self.state().id, %at, %error, "heartbeat not acknowledged");
            }
        }
    }

    /// Stamp the pilot heartbeat file and detect a suspension of the pilot.
    async fn on_supervise(&mut self, now: DateTime<Utc>) {
        let Some(pilot_file) = &self.pilot_file else {
            return;
        };

        match pilot_file.stamp(HeartbeatStamp::Pilot, now).await {
            Ok(previous) => {
                // Stamps left by an earlier pilot run say nothing about this job.
                let stamped_by_us = previous
                    .last_pilot_update()
                    .is_some_and(|at| at >= self.state().start_time);
                let gap = previous
                    .suspension(self.registry.suspension_limit, now)
                    .filter(|_| stamped_by_us);
                if let Some(gap) = gap {
                    warn!(
                        job_id = %self.state().id,
                        gap_secs = gap.as_secs(),
                        "pilot was suspended"
                    );
                    if let Some(journal) = &self.journal {
                        record(
                            journal,
                            &JournalEntry::new(
                                self.state().id.clone(),
                                now,
                                JournalEvent::Suspended {
                                    gap_secs: gap.as_secs(),
                                },
                            ),
                        );
                    }
                }
            }
            Err(e) => warn!(job_id = %self.state().id, error = %e, "failed to stamp pilot heartbeat"),
        }
    }

    fn spawn_reporter(
        &self,
        status_tx: &watch::Sender<ReportedStatus>,
        events_tx: &mpsc::Sender<HeartbeatEvent>,
        shutdown: &broadcast::Sender<()>,
    ) -> Option<JoinHandle<()>> {
        self.reporter.as_ref().map(|reporter| {
            reporter.spawn(status_tx.subscribe(), events_tx.clone(), shutdown.subscribe())
        })
    }

    fn reported(&self) -> ReportedStatus {
        ReportedStatus {
            status: self.controller.status(),
            pending_error: self.controller.pending_error().cloned(),
        }
    }

    fn publish(&self, status_tx: &watch::Sender<ReportedStatus>) {
        let current = self.reported();
        status_tx.send_if_modified(|published| {
            if *published == current {
                false
            } else {
                *published = current;
                true
            }
        });
    }

    fn journal_tick(
        &self,
        verdicts: &[Verdict],
        decision: &LifecycleDecision,
        before: LifecycleStatus,
        now: DateTime<Utc>,
    ) {
        let Some(journal) = &self.journal else {
            return;
        };
        let state = self.controller.state();

        if verdicts.iter().any(|v| v.observation.is_some()) {
            record(journal, &JournalEntry::measurement(state, now));
        }
        if let LifecycleDecision::ContinueWithWarning { warnings } = decision {
            for warning in warnings {
                record(journal, &JournalEntry::warning(&state.id, warning, now));
            }
        }
        if let (LifecycleDecision::Terminate { .. }, Some(error)) = (decision, &state.pending_error) {
            if before.is_live() {
                record(
                    journal,
                    &JournalEntry::new(
                        state.id.clone(),
                        now,
                        JournalEvent::Error {
                            error_kind: error.kind,
                            diagnostic: error.diagnostic.clone(),
                        },
                    ),
                );
            }
        }
        if before != state.lifecycle_status {
            record(
                journal,
                &JournalEntry::new(
                    state.id.clone(),
                    now,
                    JournalEvent::StatusChanged {
                        from: before,
                        to: state.lifecycle_status,
                    },
                ),
            );
        }
    }
}

fn record(journal: &JobJournal, entry: &JournalEntry) {
    if let Err(e) = journal.record(entry) {
        error!(job_id = %entry.job_id, error = %e, "failed to write journal entry");
    }
}
