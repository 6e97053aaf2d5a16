//! Outbound notifications.
//!
//! The worker renders a [`RecommendationEmail`] and hands it to a
//! [`Notifier`]. Delivery failures come back as a typed error so the worker
//! can decide on retries itself.

pub mod email;
pub mod relay;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use email::RecommendationEmail;
pub use relay::{HttpEmailNotifier, LogNotifier};

/// Sends a message to a destination address.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one message and returns the provider's message id.
    async fn send(&self, destination: &str, subject: &str, body: &str)
        -> Result<String, NotifyError>;
}
