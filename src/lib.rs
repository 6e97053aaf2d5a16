//! dining-concierge: queued restaurant recommendations.
//!
//! A dining request collected by a conversational front end is queued as a
//! job. The fulfillment worker picks it up, samples matching restaurants from
//! a search index, enriches them from a record store and emails the result.

pub mod cli;
pub mod config;
pub mod error;
pub mod intake;
pub mod notify;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod worker;

// Re-export commonly used error types
pub use error::{IntakeError, JobError, NotifyError, SearchError, StoreError};
