// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notification Worker
//!
//! Background task delivering scheduled notifications by mail.
//!
//! ## Strategy
//!
//! Each iteration has three phases, and only the last one writes:
//! 1. From a snapshot, fetch up to 100 due notifications (`send_after < now`,
//!    attempts left), oldest creation time first, with their owners' emails.
//! 2. Mail each one to its owner. No transaction is open, so requests are
//!    never stalled behind the mail relay.
//! 3. In one transaction, apply the results. A sent notification is deleted;
//!    a failed send increments `times_tried`, and the third failure moves the
//!    row to the dead-letter table. A notification whose owner no longer
//!    exists is dead-lettered without a send. Rows that disappeared during
//!    phase 2 (cancelled by their owner) are skipped.
//!
//! One failed send never stops the rest of the batch. An empty batch sleeps
//! for the idle interval (10 minutes by default). A storage failure rolls
//! phase 3 back and retries after an exponential backoff (1 s doubling to
//! 60 s), reset by the next success.
//!
//! ## Delivery Guarantee
//!
//! At least once. The mail relay and the database do not commit together:
//! a crash or rollback between a send and phase 3 resends that notification
//! on a later iteration.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`. Cancellation is checked before
//! every fetch, every send and every sleep. Results of sends already made
//! are still applied.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mailer::{MailError, Mailer};
use crate::models::Notification;
use crate::storage::{
    AttemptOutcome, ScopeError, StoreError, StoreResult, TransactionScope, BATCH_SIZE,
};

/// Default sleep after an empty batch.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(600);

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("notification worker stopped on fatal storage error: {0}")]
    Fatal(#[source] ScopeError<StoreError>),
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub fetched: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

/// What phase 2 did with one notification.
enum Delivery {
    Sent,
    Failed(MailError),
    OwnerMissing,
}

impl IterationReport {
    /// Every fetched notification failed to send.
    fn all_failed(&self) -> bool {
        self.fetched > 0 && self.delivered == 0 && self.retried + self.dead_lettered == self.fetched
    }
}

pub struct NotificationWorker {
    scope: TransactionScope,
    mailer: Arc<dyn Mailer>,
    idle_interval: Duration,
    batch_size: usize,
}

impl NotificationWorker {
    pub fn new(scope: TransactionScope, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            scope,
            mailer,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Run until `shutdown` is cancelled or a fatal storage error occurs.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.child_token()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        info!(
            idle_secs = self.idle_interval.as_secs(),
            batch_size = self.batch_size,
            "Notification worker starting"
        );

        let mut backoff = INITIAL_BACKOFF;
        loop {
            if shutdown.is_cancelled() {
                info!("Notification worker shutting down");
                return Ok(());
            }

            let pause = match self.run_iteration(&shutdown).await {
                Ok(report) if report.fetched == 0 => {
                    backoff = INITIAL_BACKOFF;
                    self.idle_interval
                }
                Ok(report) if report.all_failed() => {
                    warn!(?report, backoff_secs = backoff.as_secs(), "Every delivery in batch failed");
                    next_backoff(&mut backoff)
                }
                Ok(report) => {
                    backoff = INITIAL_BACKOFF;
                    info!(?report, "Notification batch processed");
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Notification worker stopping");
                    return Err(WorkerError::Fatal(e));
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Notification iteration rolled back");
                    next_backoff(&mut backoff)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {},
                _ = shutdown.cancelled() => {
                    info!("Notification worker shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Fetch and deliver one batch as of now.
    pub async fn run_iteration(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<IterationReport, ScopeError<StoreError>> {
        self.run_iteration_at(chrono::Utc::now().timestamp(), shutdown)
            .await
    }

    async fn run_iteration_at(
        &self,
        now: i64,
        shutdown: &CancellationToken,
    ) -> Result<IterationReport, ScopeError<StoreError>> {
        let batch = self.fetch_due(now).map_err(ScopeError::Work)?;
        let fetched = batch.len();

        let mut results = Vec::with_capacity(fetched);
        for (notification, owner_email) in batch {
            if shutdown.is_cancelled() {
                break;
            }
            let delivery = match owner_email {
                None => Delivery::OwnerMissing,
                Some(email) => match self
                    .mailer
                    .send(&email, &notification.title, &notification.body)
                    .await
                {
                    Ok(()) => Delivery::Sent,
                    Err(e) => Delivery::Failed(e),
                },
            };
            results.push((notification, delivery));
        }

        if results.is_empty() {
            return Ok(IterationReport {
                fetched,
                ..Default::default()
            });
        }

        let mut report = self
            .scope
            .run(|tx| async move {
                let txn = tx.lock().await?;
                let notifications = txn.notifications();
                let mut report = IterationReport::default();

                for (notification, delivery) in results {
                    let id = notification.id;
                    let applied = match delivery {
                        Delivery::Sent => notifications
                            .delete(id, &notification.user_id)
                            .map(|()| report.delivered += 1),
                        Delivery::OwnerMissing => {
                            warn!(
                                notification_id = id,
                                user_id = %notification.user_id,
                                "Notification owner missing; dead-lettering"
                            );
                            notifications
                                .dead_letter(id)
                                .map(|()| report.dead_lettered += 1)
                        }
                        Delivery::Failed(e) => {
                            notifications
                                .record_failed_attempt(id)
                                .map(|outcome| match outcome {
                                    AttemptOutcome::Retry { times_tried } => {
                                        warn!(
                                            notification_id = id,
                                            times_tried,
                                            error = %e,
                                            "Notification delivery failed; will retry"
                                        );
                                        report.retried += 1;
                                    }
                                    AttemptOutcome::DeadLettered => {
                                        warn!(
                                            notification_id = id,
                                            error = %e,
                                            "Notification delivery failed permanently; dead-lettered"
                                        );
                                        report.dead_lettered += 1;
                                    }
                                })
                        }
                    };
                    match applied {
                        Ok(()) => {}
                        Err(StoreError::NotFound(_)) => {
                            debug!(notification_id = id, "Notification cancelled during delivery");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(report)
            })
            .await?;

        report.fetched = fetched;
        Ok(report)
    }

    /// Due notifications paired with their owner's email, read from a snapshot.
    fn fetch_due(&self, now: i64) -> StoreResult<Vec<(Notification, Option<String>)>> {
        let snapshot = self.scope.snapshot()?;
        let users = snapshot.users();
        let batch = snapshot
            .notifications()
            .pending_batch(now, self.batch_size)?;

        let mut due = Vec::with_capacity(batch.len());
        for notification in batch {
            let owner_email = match users.get_by_id(&notification.user_id) {
                Ok(owner) => Some(owner.email),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            due.push((notification, owner_email));
        }
        Ok(due)
    }
}

fn next_backoff(backoff: &mut Duration) -> Duration {
    let pause = *backoff;
    *backoff = (*backoff * 2).min(MAX_BACKOFF);
    pause
}
