//! In-process visibility-timeout queue.
//!
//! Mirrors [`super::RedisJobQueue`] semantics without a server. Used for
//! local dry runs and by tests that need to observe acknowledgements.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::job::QueueMessage;
use super::queue::{message_id_from_receipt, receipt_for, JobQueue, QueueError};

/// Number of deleted ids remembered for [`MemoryJobQueue::deleted_ids`].
pub const DELETED_HISTORY: usize = 1024;

#[derive(Debug)]
struct StoredMessage {
    body: String,
    receive_count: u32,
    /// Receipt and visibility deadline of the current delivery.
    in_flight: Option<(String, Instant)>,
}

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<String>,
    messages: HashMap<String, StoredMessage>,
    deleted: VecDeque<String>,
}

/// In-memory implementation of [`JobQueue`].
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    state: Mutex<State>,
}

impl MemoryJobQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of messages waiting to be received.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Returns the number of messages still held, pending or in flight.
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Returns whether the queue holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the ids of the most recently deleted messages, oldest first.
    ///
    /// At most [`DELETED_HISTORY`] ids are kept.
    pub async fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().await.deleted.iter().cloned().collect()
    }

    /// Makes every in-flight message immediately visible again, as if its
    /// visibility timeout had expired.
    pub async fn expire_in_flight(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        for message in state.messages.values_mut() {
            if let Some((_, deadline)) = message.in_flight.as_mut() {
                *deadline = now;
            }
        }
    }

    fn reclaim_expired(state: &mut State, now: Instant) {
        let mut expired: Vec<String> = state
            .messages
            .iter()
            .filter(|(_, m)| matches!(m.in_flight, Some((_, deadline)) if deadline <= now))
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();

        for id in expired {
            if let Some(message) = state.messages.get_mut(&id) {
                message.in_flight = None;
            }
            state.pending.push_front(id);
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state.messages.insert(
            id.clone(),
            StoredMessage {
                body: body.to_string(),
                receive_count: 0,
                in_flight: None,
            },
        );
        state.pending.push_back(id.clone());
        Ok(id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        Self::reclaim_expired(&mut state, now);

        let mut received = Vec::new();
        while received.len() < max_messages {
            let Some(id) = state.pending.pop_front() else {
                break;
            };
            let Some(message) = state.messages.get_mut(&id) else {
                continue;
            };

            let receipt = receipt_for(&id);
            message.receive_count += 1;
            message.in_flight = Some((receipt.clone(), now + visibility_timeout));
            received.push(
                QueueMessage::new(id, receipt, message.body.clone())
                    .with_receive_count(message.receive_count),
            );
        }

        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<bool, QueueError> {
        let id = message_id_from_receipt(receipt_handle)?.to_string();
        let mut state = self.state.lock().await;

        let current = state
            .messages
            .get(&id)
            .and_then(|m| m.in_flight.as_ref())
            .map(|(receipt, _)| receipt.as_str());
        if current != Some(receipt_handle) {
            return Ok(false);
        }

        state.messages.remove(&id);
        if state.deleted.len() == DELETED_HISTORY {
            state.deleted.pop_front();
        }
        state.deleted.push_back(id);
        Ok(true)
    }
}
