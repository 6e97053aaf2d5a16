//! Invocation payloads and results.
//!
//! An invocation either carries its batch (push: an SQS-style `Records`
//! payload) or asks the worker to receive one from the queue (pull: any
//! other payload, typically a scheduler tick).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::scheduler::{QueueError, QueueMessage};

use super::fulfillment::BatchReport;

/// Errors raised while decoding an invocation payload.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Malformed push payload: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

/// How the current batch reached the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Jobs arrived inside the invocation payload; the trigger acknowledges them.
    Push,
    /// Jobs were received by the worker, which must delete them itself.
    Pull,
}

/// A single worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Batch embedded in the payload.
    Push(Vec<QueueMessage>),
    /// Batch to be received from the queue.
    Pull,
}

impl Invocation {
    /// Detects the delivery model of a raw invocation payload.
    pub fn from_event(event: &Value) -> Result<Self, InvocationError> {
        if event.get("Records").is_none() {
            return Ok(Self::Pull);
        }

        let payload: PushPayload = serde_json::from_value(event.clone())?;
        let messages = payload
            .records
            .into_iter()
            .map(PushRecord::into_message)
            .collect();
        Ok(Self::Push(messages))
    }

    /// Returns the delivery mode of this invocation.
    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Push(_) => DeliveryMode::Push,
            Self::Pull => DeliveryMode::Pull,
        }
    }
}

/// SQS-style push payload.
#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "Records")]
    records: Vec<PushRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushRecord {
    message_id: String,
    #[serde(default)]
    receipt_handle: String,
    body: String,
    #[serde(default)]
    attributes: PushAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct PushAttributes {
    #[serde(rename = "ApproximateReceiveCount")]
    approximate_receive_count: Option<String>,
}

impl PushRecord {
    fn into_message(self) -> QueueMessage {
        let receive_count = self
            .attributes
            .approximate_receive_count
            .and_then(|c| c.parse().ok())
            .unwrap_or(1);
        QueueMessage::new(self.message_id, self.receipt_handle, self.body)
            .with_receive_count(receive_count)
    }
}

/// Counters reported for an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationBody {
    pub processed: u32,
    pub failed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A message the push trigger must leave on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Structured result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: InvocationBody,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl InvocationResult {
    /// Builds the result of a batch that was processed.
    ///
    /// Item failures are only reported for pushed batches; in pull mode the
    /// worker settles messages itself.
    pub fn from_report(report: &BatchReport, mode: DeliveryMode) -> Self {
        let failed_items = match mode {
            DeliveryMode::Push => report.unacknowledged.as_slice(),
            DeliveryMode::Pull => &[],
        };
        Self {
            status_code: 200,
            body: InvocationBody {
                processed: report.processed,
                failed: report.failed,
                error: None,
            },
            batch_item_failures: failed_items
                .iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.clone(),
                })
                .collect(),
        }
    }

    /// Builds the result of an invocation that could not obtain a batch.
    pub fn receive_failed(error: &QueueError) -> Self {
        Self::error(500, error.to_string())
    }

    /// Builds an error result with no jobs processed.
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: InvocationBody {
                error: Some(message.into()),
                ..InvocationBody::default()
            },
            batch_item_failures: Vec::new(),
        }
    }

    /// Returns whether the invocation itself succeeded.
    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}
