//! Periodic heartbeat reporting for one job.
//!
//! The reporter reads the job's latest status from a watch channel and hands
//! it to a [`HeartbeatSender`] every heartbeat period, and immediately
//! whenever the status changes. Send attempts and acknowledgements travel
//! back to the job monitor as [`HeartbeatEvent`]s; the monitor alone updates
//! the job record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::{LifecycleStatus, PendingError};
use crate::domain::ports::{HeartbeatMessage, HeartbeatSender};

/// Status published by the job monitor for the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedStatus {
    pub status: LifecycleStatus,
    pub pending_error: Option<PendingError>,
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    Sent { at: DateTime<Utc> },
    Acked { at: DateTime<Utc> },
    Failed { at: DateTime<Utc>, error: String },
}

#[derive(Clone)]
pub struct HeartbeatReporter {
    sender: Arc<dyn HeartbeatSender>,
    job_id: String,
    pilot_id: String,
    period: Duration,
}

impl HeartbeatReporter {
    pub fn new(
        sender: Arc<dyn HeartbeatSender>,
        job_id: impl Into<String>,
        pilot_id: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            sender,
            job_id: job_id.into(),
            pilot_id: pilot_id.into(),
            period,
        }
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Start the reporting loop.
    ///
    /// The first heartbeat goes out immediately. The loop ends after
    /// reporting a terminal status, on shutdown, or once the monitor drops
    /// its end of either channel.
    pub fn spawn(
        &self,
        mut status: watch::Receiver<ReportedStatus>,
        events: mpsc::Sender<HeartbeatEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let reporter = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reporter.period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(
                job_id = %reporter.job_id,
                period_secs = reporter.period.as_secs(),
                "heartbeat reporter started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = status.changed() => {
                        if changed.is_err() {
                            debug!(job_id = %reporter.job_id, "status channel closed");
                            break;
                        }
                        interval.reset();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(job_id = %reporter.job_id, "heartbeat reporter shutting down");
                        break;
                    }
                }

                let current = status.borrow_and_update().clone();
                if !reporter.report(&current, &events).await {
                    break;
                }
                if current.status.is_terminal() {
                    break;
                }
            }

            info!(job_id = %reporter.job_id, "heartbeat reporter stopped");
        })
    }

    /// Send one heartbeat. Returns `false` once the monitor stopped listening.
    async fn report(&self, current: &ReportedStatus, events: &mpsc::Sender<HeartbeatEvent>) -> bool {
        let sent_at = Utc::now();
        let message = HeartbeatMessage {
            job_id: self.job_id.clone(),
            pilot_id: self.pilot_id.clone(),
            status: current.status,
            pending_error: current.pending_error.clone(),
            sent_at,
        };

        if events.send(HeartbeatEvent::Sent { at: sent_at }).await.is_err() {
            return false;
        }

        let outcome = match self.sender.send(&message).await {
            Ok(ack) => {
                debug!(job_id = %self.job_id, status = %current.status, "heartbeat acknowledged");
                HeartbeatEvent::Acked { at: ack.acked_at }
            }
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "heartbeat delivery failed");
                HeartbeatEvent::Failed {
                    at: Utc::now(),
                    error: e.to_string(),
                }
            }
        };

        events.send(outcome).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{WatchdogError, WatchdogResult};
    use crate::domain::ports::HeartbeatAck;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<LifecycleStatus>>,
        fail: bool,
    }

    #[async_trait]
    impl HeartbeatSender for RecordingSender {
        async fn send(&self, message: &HeartbeatMessage) -> WatchdogResult<HeartbeatAck> {
            self.sent.lock().unwrap().push(message.status);
            if self.fail {
                return Err(WatchdogError::HeartbeatDelivery("server unreachable".to_string()));
            }
            Ok(HeartbeatAck { acked_at: Utc::now() })
        }
    }

    fn running() -> ReportedStatus {
        ReportedStatus {
            status: LifecycleStatus::Running,
            pending_error: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_is_immediate_and_acked() {
        let sender = Arc::new(RecordingSender::default());
        let reporter = HeartbeatReporter::new(sender.clone(), "1", "pilot", Duration::from_secs(1800));
        let (_status_tx, status_rx) = watch::channel(running());
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = reporter.spawn(status_rx, events_tx, shutdown_tx.subscribe());

        assert!(matches!(events_rx.recv().await, Some(HeartbeatEvent::Sent { .. })));
        assert!(matches!(events_rx.recv().await, Some(HeartbeatEvent::Acked { .. })));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_change_reported_and_terminal_ends_loop() {
        let sender = Arc::new(RecordingSender::default());
        let reporter = HeartbeatReporter::new(sender.clone(), "1", "pilot", Duration::from_secs(1800));
        let (status_tx, status_rx) = watch::channel(running());
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = reporter.spawn(status_rx, events_tx, shutdown_tx.subscribe());
        events_rx.recv().await;
        events_rx.recv().await;

        status_tx
            .send(ReportedStatus {
                status: LifecycleStatus::Done,
                pending_error: None,
            })
            .unwrap();

        handle.await.unwrap();
        assert_eq!(
            *sender.sent.lock().unwrap(),
            vec![LifecycleStatus::Running, LifecycleStatus::Done]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_is_reported() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..RecordingSender::default()
        });
        let reporter = HeartbeatReporter::new(sender, "1", "pilot", Duration::from_secs(60));
        let (_status_tx, status_rx) = watch::channel(running());
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = reporter.spawn(status_rx, events_tx, shutdown_tx.subscribe());
        events_rx.recv().await;
        assert!(matches!(events_rx.recv().await, Some(HeartbeatEvent::Failed { .. })));

        drop(events_rx);
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
