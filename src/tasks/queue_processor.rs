use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::email::{EmailMessage, FailureOutcome, RetryPolicy};
use crate::metrics::{DeliveryMetrics, QueueMetrics};
use crate::provider::{EmailProvider, OutboundEmail};
use crate::store::{MessageStore, StoreError};

/// Queue processor tuning
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub batch_size: usize,
    pub interval: Duration,
    /// 1 processes a batch sequentially
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl From<&QueueConfig> for ProcessorConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            interval: Duration::from_secs(config.processing_interval_seconds.max(1)),
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::from(config),
        }
    }
}

/// What happened to one message during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    RetryScheduled,
    Exhausted,
    Rejected,
    Skipped,
    Error,
}

/// Counts for one processing tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub fetched: usize,
    pub sent: usize,
    pub retry_scheduled: usize,
    /// Failed on the last allowed attempt
    pub exhausted: usize,
    /// Refused by the provider with a non-retryable error
    pub rejected: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent => self.sent += 1,
            Outcome::RetryScheduled => self.retry_scheduled += 1,
            Outcome::Exhausted => self.exhausted += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Error => self.errors += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

/// Background task that drains due messages through the provider.
///
/// Persistence always follows the send, so a batch dropped mid-flight leaves
/// its messages in their pre-attempt state and they are picked up again.
pub struct QueueProcessor {
    store: Arc<dyn MessageStore>,
    provider: Arc<dyn EmailProvider>,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn EmailProvider>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            config,
        }
    }

    /// Poll until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            max_retry_attempts = self.config.retry.max_retry_attempts,
            provider = self.provider.name(),
            store = self.store.backend_name(),
            "Queue processor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Queue processor received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            tracing::info!("Queue processor received shutdown signal, abandoning in-flight batch");
                            break;
                        }
                        _ = self.tick() => {}
                    }
                }
            }
        }

        tracing::info!("Queue processor stopped");
    }

    /// One tick: process a batch and refresh the depth gauges. Store errors
    /// are logged and retried on the next tick.
    pub async fn tick(&self) -> Option<TickSummary> {
        match self.process_batch().await {
            Ok(summary) => {
                if summary.is_idle() {
                    tracing::trace!("Queue processor tick found nothing due");
                } else {
                    tracing::info!(
                        fetched = summary.fetched,
                        sent = summary.sent,
                        retry_scheduled = summary.retry_scheduled,
                        exhausted = summary.exhausted,
                        rejected = summary.rejected,
                        skipped = summary.skipped,
                        errors = summary.errors,
                        "Queue processor tick completed"
                    );
                }

                match self
                    .store
                    .stats(self.clock.now(), self.config.retry.max_retry_attempts)
                    .await
                {
                    Ok(stats) => QueueMetrics::set_depth(&stats),
                    Err(e) => tracing::debug!(error = %e, "Failed to refresh queue depth"),
                }

                Some(summary)
            }
            Err(e) => {
                QueueMetrics::record_tick_error();
                tracing::warn!(error = %e, "Queue processor could not fetch due messages");
                None
            }
        }
    }

    /// Fetch due messages and attempt each one.
    pub async fn process_batch(&self) -> Result<TickSummary, StoreError> {
        let due = self
            .store
            .fetch_due(
                self.config.batch_size,
                self.clock.now(),
                self.config.retry.max_retry_attempts,
            )
            .await?;

        QueueMetrics::record_tick(due.len());

        let mut summary = TickSummary {
            fetched: due.len(),
            ..TickSummary::default()
        };

        if self.config.concurrency <= 1 {
            for message in due {
                summary.record(self.process_message(message).await);
            }
            return Ok(summary);
        }

        let shared = Mutex::new(summary);
        stream::iter(due)
            .for_each_concurrent(self.config.concurrency, |message| {
                let shared = &shared;
                async move {
                    let outcome = self.process_message(message).await;
                    shared
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .record(outcome);
                }
            })
            .await;

        Ok(shared.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    async fn process_message(&self, mut message: EmailMessage) -> Outcome {
        let max_retry_attempts = self.config.retry.max_retry_attempts;

        if !message.is_due(self.clock.now(), max_retry_attempts) {
            tracing::debug!(email_id = %message.id, status = %message.status, "Message no longer due, skipping");
            return Outcome::Skipped;
        }

        let outbound = OutboundEmail::from(&message);
        let result = self.provider.send(&outbound).await;
        let now = self.clock.now();

        let outcome = match result {
            Ok(receipt) => {
                if let Err(e) = message.mark_sent(receipt.message_id, now) {
                    tracing::error!(email_id = %message.id, error = %e, "Cannot mark message sent");
                    return Outcome::Error;
                }
                DeliveryMetrics::record_sent(receipt.provider);
                Outcome::Sent
            }
            Err(e) => {
                DeliveryMetrics::record_failed(e.kind());
                let failure = match message.record_failure(
                    e.to_string(),
                    e.is_retryable(),
                    &self.config.retry,
                    now,
                ) {
                    Ok(failure) => failure,
                    Err(err) => {
                        tracing::error!(email_id = %message.id, error = %err, "Cannot record delivery failure");
                        return Outcome::Error;
                    }
                };

                match failure {
                    FailureOutcome::RetryScheduled { next_retry_at } => {
                        DeliveryMetrics::record_retry_scheduled();
                        tracing::warn!(
                            email_id = %message.id,
                            retry_count = message.retry_count,
                            next_retry_at = %next_retry_at,
                            error = %e,
                            "Email delivery failed, retry scheduled"
                        );
                        Outcome::RetryScheduled
                    }
                    FailureOutcome::Exhausted => {
                        DeliveryMetrics::record_exhausted();
                        tracing::error!(
                            email_id = %message.id,
                            retry_count = message.retry_count,
                            error = %e,
                            "Email delivery failed, retries exhausted"
                        );
                        Outcome::Exhausted
                    }
                    FailureOutcome::Rejected => {
                        DeliveryMetrics::record_rejected();
                        tracing::error!(
                            email_id = %message.id,
                            retry_count = message.retry_count,
                            kind = e.kind(),
                            error = %e,
                            "Email rejected by provider, not retrying"
                        );
                        Outcome::Rejected
                    }
                }
            }
        };

        if let Err(e) = self.store.update(&message).await {
            // The send already happened; the message will be attempted again
            tracing::error!(
                email_id = %message.id,
                status = %message.status,
                error = %e,
                "Failed to persist message state after delivery attempt"
            );
            return Outcome::Error;
        }

        if outcome == Outcome::Sent {
            tracing::info!(
                email_id = %message.id,
                provider = self.provider.name(),
                provider_message_id = message.provider_message_id.as_deref().unwrap_or("-"),
                "Email sent"
            );
        }

        outcome
    }
}
