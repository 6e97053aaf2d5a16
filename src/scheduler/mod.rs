//! Job queue infrastructure for dining requests.
//!
//! This module provides the queue side of the fulfillment pipeline:
//!
//! - **DiningJob**: The canonical request schema, with alias normalization
//! - **JobQueue**: At-least-once queue trait with visibility timeouts
//! - **RedisJobQueue**: Production backend built on Redis
//! - **MemoryJobQueue**: In-process backend for dry runs and tests
//!
//! # Architecture
//!
//! ```text
//!      ┌──────────────┐
//!      │ Dialog Intake│
//!      └──────┬───────┘
//!             │ send
//!      ┌──────▼───────┐  receive / delete   ┌────────────────────┐
//!      │  Job Queue   │◄────────────────────┤ Fulfillment Worker │
//!      └──────────────┘                     └────────────────────┘
//! ```
//!
//! # Reliability Features
//!
//! - **Visibility timeout**: Received messages are hidden, not removed
//! - **Redelivery**: Unacknowledged messages reappear after the timeout
//! - **Receipt handles**: A stale delivery can never delete a newer one

pub mod job;
pub mod memory;
pub mod queue;

// Re-export main types for convenience
pub use job::{DiningJob, QueueMessage};
pub use memory::MemoryJobQueue;
pub use queue::{JobQueue, QueueError, RedisJobQueue};
