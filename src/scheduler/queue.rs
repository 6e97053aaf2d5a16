//! Visibility-timeout job queue.
//!
//! The worker talks to the queue through the [`JobQueue`] trait. The
//! production backend is [`RedisJobQueue`], which emulates an at-least-once,
//! visibility-timeout queue on top of Redis:
//!
//! - Received messages stay invisible until their visibility deadline passes
//! - Unacknowledged messages are redelivered once their deadline expires
//! - Deleting requires the receipt handle of the *current* delivery
//!
//! # Queue Structure
//!
//! - `{queue_name}`: List of pending message ids
//! - `{queue_name}:messages`: Hash of message id to body
//! - `{queue_name}:inflight`: Sorted set of received ids scored by visibility deadline (ms)
//! - `{queue_name}:receipts`: Hash of message id to current receipt handle
//! - `{queue_name}:receive_counts`: Hash of message id to delivery count

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::job::QueueMessage;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to the queue backend.
    #[error("Queue connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Receipt handle does not belong to this queue.
    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// An at-least-once queue with visibility timeouts.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a message and returns its id.
    async fn send(&self, body: &str) -> Result<String, QueueError>;

    /// Receives up to `max_messages`, hiding them for `visibility_timeout`.
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledges one delivery.
    ///
    /// Returns `false` when the receipt is stale: the message was already
    /// deleted or has since been redelivered under a new receipt.
    async fn delete(&self, receipt_handle: &str) -> Result<bool, QueueError>;
}

/// Moves expired deliveries back to the pending list, then pops up to
/// `ARGV[1]` ids and marks each one in flight until `ARGV[3]`.
///
/// KEYS: pending, messages, inflight, receipts, receive_counts.
/// ARGV: max messages, now (ms), visibility deadline (ms), one receipt
/// nonce per message. Replies with a flat `id, receipt, body, count` list.
const RECEIVE_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', ARGV[2])
for _, id in ipairs(expired) do
    redis.call('ZREM', KEYS[3], id)
    redis.call('HDEL', KEYS[4], id)
    -- Right end is the dequeue end: redeliveries go first.
    redis.call('RPUSH', KEYS[1], id)
end

local max = tonumber(ARGV[1])
local received = {}
local n = 0
while n < max do
    local id = redis.call('RPOP', KEYS[1])
    if not id then
        break
    end
    local body = redis.call('HGET', KEYS[2], id)
    if body then
        local receipt = id .. ':' .. ARGV[4 + n]
        redis.call('ZADD', KEYS[3], ARGV[3], id)
        redis.call('HSET', KEYS[4], id, receipt)
        local count = redis.call('HINCRBY', KEYS[5], id, 1)
        table.insert(received, id)
        table.insert(received, receipt)
        table.insert(received, body)
        table.insert(received, count)
        n = n + 1
    end
end
return received
"#;

/// Removes a message if `ARGV[2]` is its current receipt.
///
/// KEYS: inflight, receipts, messages, receive_counts. ARGV: id, receipt.
const DELETE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
return 1
"#;

/// Redis-backed visibility-timeout queue.
///
/// Receive and delete each run as one server-side script, so a dropped
/// future or a failed round trip never leaves a message popped from the
/// pending list without being tracked in flight.
pub struct RedisJobQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the pending list.
    queue_name: String,
    /// Key of the body hash.
    messages_key: String,
    /// Key of the in-flight sorted set.
    inflight_key: String,
    /// Key of the receipt hash.
    receipts_key: String,
    /// Key of the receive counter hash.
    receive_counts_key: String,
    receive_script: Script,
    delete_script: Script,
}

impl RedisJobQueue {
    /// Connects to Redis and creates a new job queue.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `queue_name` - Name of the queue (used as prefix for Redis keys)
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a queue from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        let keys = QueueKeys::new(queue_name);
        Self {
            redis,
            queue_name: keys.queue_name,
            messages_key: keys.messages,
            inflight_key: keys.inflight,
            receipts_key: keys.receipts,
            receive_counts_key: keys.receive_counts,
            receive_script: Script::new(RECEIVE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&self.messages_key, &id, body)
            .ignore()
            .lpush(&self.queue_name, &id)
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }

        let now = now_millis();
        let deadline = now + visibility_timeout.as_millis() as u64;
        let nonces: Vec<String> = (0..max_messages)
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut conn = self.redis.clone();
        let received: Vec<(String, String, String, u32)> = self
            .receive_script
            .key(&self.queue_name)
            .key(&self.messages_key)
            .key(&self.inflight_key)
            .key(&self.receipts_key)
            .key(&self.receive_counts_key)
            .arg(max_messages)
            .arg(now)
            .arg(deadline)
            .arg(&nonces)
            .invoke_async(&mut conn)
            .await?;

        let redelivered = received.iter().filter(|(.., count)| *count > 1).count();
        if redelivered > 0 {
            debug!(queue = %self.queue_name, redelivered, "Received redelivered messages");
        }

        Ok(received
            .into_iter()
            .map(|(id, receipt, body, count)| {
                QueueMessage::new(id, receipt, body).with_receive_count(count)
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<bool, QueueError> {
        let id = message_id_from_receipt(receipt_handle)?;
        let mut conn = self.redis.clone();

        let removed: i64 = self
            .delete_script
            .key(&self.inflight_key)
            .key(&self.receipts_key)
            .key(&self.messages_key)
            .key(&self.receive_counts_key)
            .arg(id)
            .arg(receipt_handle)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed == 1)
    }
}

/// Redis key names derived from a queue name.
struct QueueKeys {
    queue_name: String,
    messages: String,
    inflight: String,
    receipts: String,
    receive_counts: String,
}

impl QueueKeys {
    fn new(queue_name: &str) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            messages: format!("{}:messages", queue_name),
            inflight: format!("{}:inflight", queue_name),
            receipts: format!("{}:receipts", queue_name),
            receive_counts: format!("{}:receive_counts", queue_name),
        }
    }
}

/// Builds a receipt handle unique to one delivery of `message_id`.
pub(crate) fn receipt_for(message_id: &str) -> String {
    format!("{}:{}", message_id, Uuid::new_v4())
}

/// Extracts the message id a receipt handle was issued for.
pub(crate) fn message_id_from_receipt(receipt_handle: &str) -> Result<&str, QueueError> {
    match receipt_handle.split_once(':') {
        Some((id, delivery)) if !id.is_empty() && !delivery.is_empty() => Ok(id),
        _ => Err(QueueError::InvalidReceipt(receipt_handle.to_string())),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
