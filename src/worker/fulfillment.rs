//! The fulfillment pipeline.
//!
//! Each job goes through validate, search, enrich, notify and acknowledge.
//! The outcome of a job decides whether its message is deleted:
//!
//! | Outcome     | Counted as | Pull mode      | Push mode            |
//! |-------------|------------|----------------|----------------------|
//! | Delivered   | processed  | deleted        | acknowledged         |
//! | Terminal    | failed     | deleted        | acknowledged         |
//! | Retryable   | failed     | left in flight | reported as failure  |
//! | Deferred    | not at all | left in flight | reported as failure  |

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, NotifyError, SearchError};
use crate::notify::RecommendationEmail;
use crate::scheduler::{DiningJob, QueueError, QueueMessage};
use crate::search::find_candidates;
use crate::storage::get_details;

use super::context::WorkerContext;
use super::invocation::{DeliveryMode, Invocation, InvocationResult};

/// Reasons a job can never succeed, no matter how often it is retried.
#[derive(Debug, Error)]
pub enum TerminalFailure {
    #[error("Malformed job: {0}")]
    Malformed(#[from] JobError),

    #[error("No restaurants found for cuisine '{cuisine}'")]
    NoCandidates {
        cuisine: String,
        #[source]
        cause: Option<SearchError>,
    },

    #[error("None of the {candidates} candidates could be enriched")]
    NoDetails { candidates: usize },
}

/// Result of running one job through the pipeline.
#[derive(Debug)]
pub enum JobOutcome {
    /// The recommendation email was accepted.
    Delivered {
        email_message_id: String,
        restaurants: usize,
    },
    /// The job failed permanently and is dropped.
    Terminal(TerminalFailure),
    /// The job failed transiently and will be redelivered.
    Retryable(NotifyError),
    /// The job was not started because the invocation was about to expire.
    Deferred,
}

impl JobOutcome {
    /// Returns whether the message should be removed from the queue.
    pub fn acknowledges(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Terminal(_))
    }

    /// Returns whether the job counts as processed.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns whether the job counts as failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Terminal(_) | Self::Retryable(_))
    }
}

/// Tally of one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages in the batch.
    pub received: u32,
    /// Jobs whose email was sent.
    pub processed: u32,
    /// Jobs that failed, terminally or not.
    pub failed: u32,
    /// Jobs not started before the deadline.
    pub deferred: u32,
    /// Message ids left for redelivery, in completion order.
    pub unacknowledged: Vec<String>,
}

impl BatchReport {
    fn record(&mut self, message: &QueueMessage, outcome: &JobOutcome) {
        if outcome.is_delivered() {
            self.processed += 1;
        } else if outcome.is_failure() {
            self.failed += 1;
        } else {
            self.deferred += 1;
        }

        if !outcome.acknowledges() {
            self.unacknowledged.push(message.message_id.clone());
        }
    }
}

/// Processes batches of dining jobs.
#[derive(Debug, Clone)]
pub struct FulfillmentWorker {
    ctx: WorkerContext,
}

impl FulfillmentWorker {
    /// Creates a worker over the given collaborators.
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Returns the worker's context.
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Handles a raw invocation payload.
    ///
    /// A payload with `Records` is treated as a pushed batch; anything else
    /// triggers a pull from the queue.
    pub async fn handle_event(&self, event: &Value) -> InvocationResult {
        match Invocation::from_event(event) {
            Ok(invocation) => self.handle(invocation).await,
            Err(e) => {
                error!(error = %e, "Rejecting invocation payload");
                InvocationResult::error(400, e.to_string())
            }
        }
    }

    /// Handles one invocation.
    pub async fn handle(&self, invocation: Invocation) -> InvocationResult {
        let deadline = self.ctx.config.invocation_budget.map(|b| Instant::now() + b);

        match invocation {
            Invocation::Push(messages) => {
                let report = self
                    .process_batch(messages, DeliveryMode::Push, deadline)
                    .await;
                InvocationResult::from_report(&report, DeliveryMode::Push)
            }
            Invocation::Pull => match self.pull_batch(deadline).await {
                Ok(report) => InvocationResult::from_report(&report, DeliveryMode::Pull),
                Err(e) => InvocationResult::receive_failed(&e),
            },
        }
    }

    /// Receives one batch from the queue and processes it.
    ///
    /// Fails only when the queue itself cannot be read.
    pub async fn pull_batch(&self, deadline: Option<Instant>) -> Result<BatchReport, QueueError> {
        let config = &self.ctx.config;
        let messages = tokio::time::timeout(
            config.call_timeout,
            self.ctx
                .queue
                .receive(config.batch_size, config.visibility_timeout),
        )
        .await
        .map_err(|_| QueueError::Timeout(config.call_timeout))
        .and_then(|r| r)
        .map_err(|e| {
            error!(error = %e, "Failed to receive jobs");
            e
        })?;

        if messages.is_empty() {
            debug!("No jobs available");
        }

        Ok(self
            .process_batch(messages, DeliveryMode::Pull, deadline)
            .await)
    }

    /// Runs every message of a batch through the pipeline.
    ///
    /// Up to `concurrency` jobs run at once. In pull mode, messages with a
    /// terminal or delivered outcome are deleted as soon as their job ends.
    pub async fn process_batch(
        &self,
        messages: Vec<QueueMessage>,
        mode: DeliveryMode,
        deadline: Option<Instant>,
    ) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len() as u32,
            ..BatchReport::default()
        };
        if messages.is_empty() {
            return report;
        }

        info!(
            messages = messages.len(),
            mode = ?mode,
            concurrency = self.ctx.config.concurrency,
            "Processing batch"
        );

        let outcomes: Vec<(QueueMessage, JobOutcome)> = stream::iter(messages)
            .map(|message| async move {
                let outcome = self.run_job(&message, mode, deadline).await;
                (message, outcome)
            })
            .buffer_unordered(self.ctx.config.concurrency.max(1))
            .collect()
            .await;

        for (message, outcome) in &outcomes {
            report.record(message, outcome);
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            deferred = report.deferred,
            "Batch complete"
        );
        report
    }

    /// Runs the pipeline for one message and settles it.
    async fn run_job(
        &self,
        message: &QueueMessage,
        mode: DeliveryMode,
        deadline: Option<Instant>,
    ) -> JobOutcome {
        if !self.has_time_left(deadline) {
            warn!(
                message_id = %message.message_id,
                "Deadline approaching, leaving job for redelivery"
            );
            return JobOutcome::Deferred;
        }

        let start_time = Instant::now();
        let outcome = self.process_message(message).await;
        let duration_ms = start_time.elapsed().as_millis();

        match &outcome {
            JobOutcome::Delivered {
                email_message_id,
                restaurants,
            } => info!(
                message_id = %message.message_id,
                email_message_id = %email_message_id,
                restaurants = restaurants,
                duration_ms = duration_ms,
                "Recommendations sent"
            ),
            JobOutcome::Terminal(reason) => warn!(
                message_id = %message.message_id,
                error = %reason,
                duration_ms = duration_ms,
                "Job failed permanently, dropping"
            ),
            JobOutcome::Retryable(e) => warn!(
                message_id = %message.message_id,
                error = %e,
                receive_count = message.receive_count,
                "Job failed, leaving for redelivery"
            ),
            JobOutcome::Deferred => {}
        }

        if mode == DeliveryMode::Pull && outcome.acknowledges() {
            self.acknowledge(message).await;
        }

        outcome
    }

    /// Validates, searches, enriches and notifies for one message.
    ///
    /// Does not touch the queue.
    pub async fn process_message(&self, message: &QueueMessage) -> JobOutcome {
        let call_timeout = self.ctx.config.call_timeout;

        if message.is_redelivery() {
            debug!(
                message_id = %message.message_id,
                receive_count = message.receive_count,
                "Processing redelivered job"
            );
        }

        let job = match DiningJob::from_message_body(&message.body)
            .and_then(|job| job.validate().map(|()| job))
        {
            Ok(job) => job,
            Err(e) => return JobOutcome::Terminal(TerminalFailure::Malformed(e)),
        };

        let candidates = match find_candidates(
            self.ctx.search.as_ref(),
            &self.ctx.sampler,
            &job.cuisine,
            call_timeout,
        )
        .await
        {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                return JobOutcome::Terminal(TerminalFailure::NoCandidates {
                    cuisine: job.cuisine,
                    cause: None,
                })
            }
            Err(e) => {
                return JobOutcome::Terminal(TerminalFailure::NoCandidates {
                    cuisine: job.cuisine,
                    cause: Some(e),
                })
            }
        };

        let restaurants = get_details(self.ctx.store.as_ref(), &candidates, call_timeout).await;
        if restaurants.is_empty() {
            return JobOutcome::Terminal(TerminalFailure::NoDetails {
                candidates: candidates.len(),
            });
        }

        let email = RecommendationEmail::compose(&job, &restaurants);
        let sent = tokio::time::timeout(
            call_timeout,
            self.ctx.notifier.send(&job.email, &email.subject, &email.body),
        )
        .await
        .unwrap_or(Err(NotifyError::Timeout(call_timeout)));

        match sent {
            Ok(email_message_id) => JobOutcome::Delivered {
                email_message_id,
                restaurants: restaurants.len(),
            },
            Err(e) => JobOutcome::Retryable(e),
        }
    }

    /// Deletes a settled message. Failures only mean it will be redelivered.
    async fn acknowledge(&self, message: &QueueMessage) {
        let call_timeout = self.ctx.config.call_timeout;
        let deleted = tokio::time::timeout(
            call_timeout,
            self.ctx.queue.delete(&message.receipt_handle),
        )
        .await
        .unwrap_or(Err(QueueError::Timeout(call_timeout)));

        match deleted {
            Ok(true) => debug!(message_id = %message.message_id, "Job acknowledged"),
            Ok(false) => warn!(
                message_id = %message.message_id,
                "Receipt expired before delete, job may be redelivered"
            ),
            Err(e) => error!(
                message_id = %message.message_id,
                error = %e,
                "Failed to delete job"
            ),
        }
    }

    fn has_time_left(&self, deadline: Option<Instant>) -> bool {
        remaining_budget(deadline).map_or(true, |remaining| {
            remaining > self.ctx.config.deadline_margin
        })
    }
}

/// Remaining time before `deadline`, or `None` when unbounded.
pub fn remaining_budget(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
