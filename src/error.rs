//! Error types for dining concierge operations.
//!
//! Defines error types for the external collaborators the worker talks to:
//! - Search index queries
//! - Restaurant record lookups
//! - Email delivery
//! - Job payload parsing
//! - Dialog intake
//!
//! Queue errors live next to the queue in [`crate::scheduler::queue`].

use std::time::Duration;

use thiserror::Error;

use crate::scheduler::QueueError;

/// Errors that can occur while querying the restaurant search index.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search index rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("Search API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse search response: {0}")]
    ParseError(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur during restaurant record lookups.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Record query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Malformed record '{id}': {reason}")]
    Malformed { id: String, reason: String },

    #[error("Record lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Email request failed: {0}")]
    RequestFailed(String),

    #[error("Email service rejected message ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Email send timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised while turning a queue message body into a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Job body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

/// Errors that can occur while handling a dialog intake event.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Malformed dialog event: {0}")]
    MalformedEvent(String),

    #[error("Failed to serialize job: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
}
