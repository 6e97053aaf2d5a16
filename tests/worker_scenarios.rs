//! End-to-end tests for the fulfillment worker.
//!
//! The queue is the in-process [`MemoryJobQueue`]; search, record store and
//! email are scripted fakes so each test controls exactly what the worker sees.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use dining_concierge::config::WorkerConfig;
use dining_concierge::error::{NotifyError, SearchError, StoreError};
use dining_concierge::notify::Notifier;
use dining_concierge::scheduler::{DiningJob, JobQueue, MemoryJobQueue, QueueError, QueueMessage};
use dining_concierge::search::{CandidateId, CandidateSampler, SearchIndex};
use dining_concierge::storage::{RecordStore, RestaurantDetail, SqliteRecordStore};
use dining_concierge::worker::{FulfillmentWorker, Invocation, Poller, WorkerContext};

// ============================================================================
// Fakes
// ============================================================================

/// Search index answering from a fixed cuisine table.
#[derive(Default)]
struct StaticIndex {
    hits: HashMap<String, Vec<CandidateId>>,
    unavailable: bool,
}

impl StaticIndex {
    fn with_cuisine(mut self, cuisine: &str, ids: &[&str]) -> Self {
        self.hits.insert(
            cuisine.to_lowercase(),
            ids.iter().map(|id| CandidateId::from(*id)).collect(),
        );
        self
    }

    fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SearchIndex for StaticIndex {
    async fn search(&self, cuisine: &str) -> Result<Vec<CandidateId>, SearchError> {
        if self.unavailable {
            return Err(SearchError::RequestFailed("connection refused".to_string()));
        }
        Ok(self
            .hits
            .get(&cuisine.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Record store backed by a map; `broken` ids fail instead of missing.
#[derive(Default)]
struct MapStore {
    records: HashMap<CandidateId, RestaurantDetail>,
    broken: HashSet<CandidateId>,
}

impl MapStore {
    fn with_restaurants(ids: &[&str]) -> Self {
        let records = ids
            .iter()
            .map(|id| {
                (
                    CandidateId::from(*id),
                    RestaurantDetail::new(format!("Restaurant {}", id))
                        .with_address(format!("{} Main St", id))
                        .with_rating(4.0, 10),
                )
            })
            .collect();
        Self {
            records,
            ..Self::default()
        }
    }

    fn with_broken(mut self, id: &str) -> Self {
        self.broken.insert(CandidateId::from(id));
        self
    }
}

#[async_trait]
impl RecordStore for MapStore {
    async fn get_restaurant(
        &self,
        id: &CandidateId,
    ) -> Result<Option<RestaurantDetail>, StoreError> {
        if self.broken.contains(id) {
            return Err(StoreError::ConnectionFailed("throttled".to_string()));
        }
        Ok(self.records.get(id).cloned())
    }
}

#[derive(Debug, Clone)]
struct SentEmail {
    destination: String,
    subject: String,
    body: String,
}

/// Notifier that records every accepted message.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
    rejected_destinations: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    fn rejecting(destination: &str) -> Self {
        let notifier = Self::default();
        notifier.reject(destination);
        notifier
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn reject(&self, destination: &str) {
        self.rejected_destinations
            .lock()
            .expect("lock")
            .insert(destination.to_string());
    }

    fn accept_all(&self) {
        self.rejected_destinations.lock().expect("lock").clear();
    }

    fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .rejected_destinations
            .lock()
            .expect("lock")
            .contains(destination)
        {
            return Err(NotifyError::Rejected {
                code: 503,
                message: "service unavailable".to_string(),
            });
        }

        let mut sent = self.sent.lock().expect("lock");
        sent.push(SentEmail {
            destination: destination.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(format!("email-{}", sent.len()))
    }
}

/// Queue whose receive always fails.
struct DownQueue;

#[async_trait]
impl JobQueue for DownQueue {
    async fn send(&self, _body: &str) -> Result<String, QueueError> {
        Err(QueueError::ConnectionFailed("down".to_string()))
    }

    async fn receive(
        &self,
        _max_messages: usize,
        _visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        Err(QueueError::ConnectionFailed("down".to_string()))
    }

    async fn delete(&self, _receipt_handle: &str) -> Result<bool, QueueError> {
        Err(QueueError::ConnectionFailed("down".to_string()))
    }
}

/// Queue whose receive reply arrives after the messages were already
/// handed out, like a slow network round trip.
struct LaggingQueue {
    inner: Arc<MemoryJobQueue>,
    lag: Duration,
}

#[async_trait]
impl JobQueue for LaggingQueue {
    async fn send(&self, body: &str) -> Result<String, QueueError> {
        self.inner.send(body).await
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let messages = self.inner.receive(max_messages, visibility_timeout).await?;
        tokio::time::sleep(self.lag).await;
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<bool, QueueError> {
        self.inner.delete(receipt_handle).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

const CHINESE_IDS: [&str; 7] = ["c1", "c2", "c3", "c4", "c5", "c6", "c7"];

struct Harness {
    queue: Arc<MemoryJobQueue>,
    notifier: Arc<RecordingNotifier>,
    worker: FulfillmentWorker,
}

fn harness(
    index: StaticIndex,
    store: impl RecordStore + 'static,
    notifier: RecordingNotifier,
) -> Harness {
    harness_with_config(index, store, notifier, WorkerConfig::default())
}

fn harness_with_config(
    index: StaticIndex,
    store: impl RecordStore + 'static,
    notifier: RecordingNotifier,
    config: WorkerConfig,
) -> Harness {
    let queue = Arc::new(MemoryJobQueue::new());
    let notifier = Arc::new(notifier);
    let sample_size = config.sample_size;
    let ctx = WorkerContext::new(
        queue.clone(),
        Arc::new(index),
        Arc::new(store),
        notifier.clone(),
    )
    .with_config(config)
    .with_sampler(CandidateSampler::with_seed(sample_size, 42));

    Harness {
        queue,
        notifier,
        worker: FulfillmentWorker::new(ctx),
    }
}

fn chinese_harness(notifier: RecordingNotifier) -> Harness {
    harness(
        StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS),
        MapStore::with_restaurants(&CHINESE_IDS),
        notifier,
    )
}

fn job_body(cuisine: &str, email: &str) -> String {
    DiningJob::new(cuisine, email)
        .with_location("Manhattan")
        .with_dining_time("7pm")
        .with_party_size("2")
        .to_message_body()
        .expect("serialize job")
}

fn entry_count(body: &str) -> usize {
    body.lines().filter(|line| line.contains("   Address: ")).count()
}

// ============================================================================
// Pull mode
// ============================================================================

#[tokio::test]
async fn test_chinese_request_is_delivered_and_deleted() {
    let h = chinese_harness(RecordingNotifier::default());
    let id = h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body.processed, 1);
    assert_eq!(result.body.failed, 0);
    assert_eq!(h.queue.deleted_ids().await, vec![id]);
    assert!(h.queue.is_empty().await);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, "a@b.com");
    assert_eq!(sent[0].subject, "Your Chinese Restaurant Recommendations");
    assert_eq!(entry_count(&sent[0].body), 5);
    assert!(sent[0]
        .body
        .contains("Chinese restaurant suggestions for 2 people, for 7pm in Manhattan"));
}

#[tokio::test]
async fn test_sampled_restaurants_are_distinct() {
    let h = chinese_harness(RecordingNotifier::default());
    h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    h.worker.handle(Invocation::Pull).await;

    let sent = h.notifier.sent();
    let names: HashSet<&str> = sent[0]
        .body
        .lines()
        .filter_map(|line| line.split_once(". Restaurant ").map(|(_, id)| id))
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|id| CHINESE_IDS.contains(id)));
}

#[tokio::test]
async fn test_unknown_cuisine_is_dropped_without_email() {
    let h = chinese_harness(RecordingNotifier::default());
    let id = h.queue.send(&job_body("Klingon", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 0);
    assert_eq!(result.body.failed, 1);
    assert_eq!(h.queue.deleted_ids().await, vec![id]);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_missing_email_is_dropped() {
    let index = StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS);
    let h = harness(index, MapStore::with_restaurants(&CHINESE_IDS), RecordingNotifier::default());
    let id = h
        .queue
        .send(r#"{"cuisine": "Chinese", "location": "Manhattan"}"#)
        .await
        .expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.failed, 1);
    assert_eq!(h.queue.deleted_ids().await, vec![id]);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_missing_cuisine_is_dropped() {
    let h = chinese_harness(RecordingNotifier::default());
    h.queue.send(r#"{"email": "a@b.com"}"#).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.failed, 1);
    assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn test_legacy_field_names_are_accepted() {
    let h = chinese_harness(RecordingNotifier::default());
    h.queue
        .send(
            &json!({
                "Location": "Brooklyn",
                "Cuisine": "chinese",
                "DiningTime": "8pm",
                "NumberOfPeople": 3,
                "Email": "legacy@b.com"
            })
            .to_string(),
        )
        .await
        .expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 1);
    let sent = h.notifier.sent();
    assert_eq!(sent[0].destination, "legacy@b.com");
    assert!(sent[0].body.contains("for 3 people, for 8pm in Brooklyn"));
}

#[tokio::test]
async fn test_notify_failure_is_retried_on_redelivery() {
    let h = chinese_harness(RecordingNotifier::rejecting("a@b.com"));
    let id = h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    let first = h.worker.handle(Invocation::Pull).await;
    assert_eq!(first.body.processed, 0);
    assert_eq!(first.body.failed, 1);
    assert!(h.queue.deleted_ids().await.is_empty());
    assert_eq!(h.queue.len().await, 1);

    // Still invisible until the visibility timeout lapses.
    let hidden = h.worker.handle(Invocation::Pull).await;
    assert_eq!(hidden.body.processed + hidden.body.failed, 0);

    h.queue.expire_in_flight().await;
    h.notifier.accept_all();

    let second = h.worker.handle(Invocation::Pull).await;
    assert_eq!(second.body.processed, 1);
    assert_eq!(h.queue.deleted_ids().await, vec![id]);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_repeated_failure_is_handled_identically() {
    let h = chinese_harness(RecordingNotifier::rejecting("a@b.com"));
    h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    for _ in 0..3 {
        let result = h.worker.handle(Invocation::Pull).await;
        assert_eq!(result.body.failed, 1);
        assert_eq!(h.queue.len().await, 1);
        h.queue.expire_in_flight().await;
    }
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_partial_enrichment_sends_remaining_restaurants() {
    let ids = ["p1", "p2", "p3", "p4", "p5"];
    let index = StaticIndex::default().with_cuisine("Thai", &ids);
    let store = MapStore::with_restaurants(&["p1", "p2", "p3", "p5"]);
    let h = harness(index, store, RecordingNotifier::default());
    h.queue.send(&job_body("Thai", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 1);
    let sent = h.notifier.sent();
    assert_eq!(entry_count(&sent[0].body), 4);
    assert!(!sent[0].body.contains("Restaurant p4"));
}

#[tokio::test]
async fn test_store_errors_are_skipped_per_candidate() {
    let ids = ["p1", "p2", "p3"];
    let index = StaticIndex::default().with_cuisine("Thai", &ids);
    let store = MapStore::with_restaurants(&ids).with_broken("p2");
    let h = harness(index, store, RecordingNotifier::default());
    h.queue.send(&job_body("Thai", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 1);
    assert_eq!(entry_count(&h.notifier.sent()[0].body), 2);
}

#[tokio::test]
async fn test_no_enriched_candidates_is_terminal() {
    let index = StaticIndex::default().with_cuisine("Thai", &["p1", "p2"]);
    let h = harness(index, MapStore::default(), RecordingNotifier::default());
    h.queue.send(&job_body("Thai", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.failed, 1);
    assert!(h.queue.is_empty().await);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_search_outage_is_terminal() {
    let h = harness(
        StaticIndex::unavailable(),
        MapStore::default(),
        RecordingNotifier::default(),
    );
    h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.failed, 1);
    assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn test_slow_notifier_times_out_and_is_retryable() {
    let config = WorkerConfig::default().with_call_timeout(Duration::from_millis(50));
    let h = harness_with_config(
        StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS),
        MapStore::with_restaurants(&CHINESE_IDS),
        RecordingNotifier::slow(Duration::from_millis(500)),
        config,
    );
    h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.failed, 1);
    assert_eq!(h.queue.len().await, 1);
    assert!(h.queue.deleted_ids().await.is_empty());
}

#[tokio::test]
async fn test_mixed_batch_counts() {
    let h = chinese_harness(RecordingNotifier::rejecting("retry@b.com"));
    let ok = h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");
    let bad = h.queue.send("{not json").await.expect("send");
    let none = h.queue.send(&job_body("Klingon", "a@b.com")).await.expect("send");
    h.queue.send(&job_body("Chinese", "retry@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 1);
    assert_eq!(result.body.failed, 3);
    assert!(result.batch_item_failures.is_empty());

    let deleted: HashSet<String> = h.queue.deleted_ids().await.into_iter().collect();
    assert_eq!(deleted, HashSet::from([ok, bad, none]));
    assert_eq!(h.queue.len().await, 1);
}

#[tokio::test]
async fn test_batch_size_bounds_receive() {
    let config = WorkerConfig::default().with_batch_size(2);
    let h = harness_with_config(
        StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS),
        MapStore::with_restaurants(&CHINESE_IDS),
        RecordingNotifier::default(),
        config,
    );
    for _ in 0..3 {
        h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");
    }

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 2);
    assert_eq!(h.queue.pending_len().await, 1);
}

#[tokio::test]
async fn test_concurrent_batch_processes_every_job() {
    let config = WorkerConfig::default().with_concurrency(4);
    let h = harness_with_config(
        StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS),
        MapStore::with_restaurants(&CHINESE_IDS),
        RecordingNotifier::default(),
        config,
    );
    for i in 0..8 {
        h.queue
            .send(&job_body("Chinese", &format!("user{}@b.com", i)))
            .await
            .expect("send");
    }

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 8);
    assert_eq!(h.queue.deleted_ids().await.len(), 8);
    let destinations: HashSet<String> =
        h.notifier.sent().into_iter().map(|e| e.destination).collect();
    assert_eq!(destinations.len(), 8);
}

#[tokio::test]
async fn test_empty_queue_reports_zero() {
    let h = chinese_harness(RecordingNotifier::default());
    let result = h.worker.handle_event(&json!({})).await;

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body.processed, 0);
    assert_eq!(result.body.failed, 0);
}

#[tokio::test]
async fn test_receive_failure_is_invocation_error() {
    let ctx = WorkerContext::new(
        Arc::new(DownQueue),
        Arc::new(StaticIndex::default()),
        Arc::new(MapStore::default()),
        Arc::new(RecordingNotifier::default()),
    );
    let worker = FulfillmentWorker::new(ctx);

    let result = worker.handle(Invocation::Pull).await;

    assert_eq!(result.status_code, 500);
    assert!(result.body.error.is_some());
}

#[tokio::test]
async fn test_timed_out_receive_redelivers_jobs() {
    let inner = Arc::new(MemoryJobQueue::new());
    let lagging = Arc::new(LaggingQueue {
        inner: inner.clone(),
        lag: Duration::from_millis(200),
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = WorkerContext::new(
        lagging,
        Arc::new(StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS)),
        Arc::new(MapStore::with_restaurants(&CHINESE_IDS)),
        notifier.clone(),
    )
    .with_config(WorkerConfig::default().with_call_timeout(Duration::from_millis(20)));
    let worker = FulfillmentWorker::new(ctx);

    let first = inner.send(&job_body("Chinese", "a@b.com")).await.expect("send");
    let second = inner.send(&job_body("Chinese", "c@d.com")).await.expect("send");

    let result = worker.handle(Invocation::Pull).await;
    assert_eq!(result.status_code, 500);
    assert!(notifier.sent().is_empty());
    // The abandoned deliveries are hidden, not gone.
    assert_eq!(inner.len().await, 2);
    assert_eq!(inner.pending_len().await, 0);

    inner.expire_in_flight().await;
    let redelivered = inner
        .receive(10, Duration::from_secs(30))
        .await
        .expect("receive");
    let mut ids: Vec<String> = redelivered.iter().map(|m| m.message_id.clone()).collect();
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(redelivered.iter().all(|m| m.receive_count == 2));
}

#[tokio::test]
async fn test_exhausted_budget_leaves_jobs_in_flight() {
    let config = WorkerConfig::default()
        .with_invocation_budget(Duration::from_secs(2))
        .with_deadline_margin(Duration::from_secs(10));
    let index = StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS);
    let h = harness_with_config(
        index,
        MapStore::with_restaurants(&CHINESE_IDS),
        RecordingNotifier::default(),
        config,
    );
    h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body.processed, 0);
    assert_eq!(result.body.failed, 0);
    assert_eq!(h.queue.len().await, 1);
    assert!(h.notifier.sent().is_empty());
}

// ============================================================================
// Push mode
// ============================================================================

fn record(message_id: &str, body: &str) -> serde_json::Value {
    json!({
        "messageId": message_id,
        "receiptHandle": format!("{}:receipt", message_id),
        "body": body,
        "attributes": { "ApproximateReceiveCount": "1" },
        "eventSource": "aws:sqs"
    })
}

#[tokio::test]
async fn test_push_batch_reports_only_retryable_failures() {
    let h = chinese_harness(RecordingNotifier::rejecting("retry@b.com"));
    let event = json!({
        "Records": [
            record("ok", &job_body("Chinese", "a@b.com")),
            record("malformed", "{}"),
            record("retry", &job_body("Chinese", "retry@b.com")),
        ]
    });

    let result = h.worker.handle_event(&event).await;

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body.processed, 1);
    assert_eq!(result.body.failed, 2);
    let failures: Vec<&str> = result
        .batch_item_failures
        .iter()
        .map(|f| f.item_identifier.as_str())
        .collect();
    assert_eq!(failures, vec!["retry"]);

    // Push mode leaves acknowledgement to the trigger.
    assert!(h.queue.deleted_ids().await.is_empty());
}

#[tokio::test]
async fn test_push_result_shape() {
    let h = chinese_harness(RecordingNotifier::default());
    let event = json!({ "Records": [ record("ok", &job_body("Chinese", "a@b.com")) ] });

    let result = h.worker.handle_event(&event).await;

    assert_eq!(
        serde_json::to_value(&result).expect("serialize"),
        json!({ "statusCode": 200, "body": { "processed": 1, "failed": 0 } })
    );
}

#[tokio::test]
async fn test_malformed_push_payload_is_rejected() {
    let h = chinese_harness(RecordingNotifier::default());
    let result = h
        .worker
        .handle_event(&json!({ "Records": "not a list" }))
        .await;

    assert_eq!(result.status_code, 400);
    assert!(h.notifier.sent().is_empty());
}

// ============================================================================
// Record store and poller
// ============================================================================

#[tokio::test]
async fn test_delivery_with_sqlite_store() {
    let store = SqliteRecordStore::connect("sqlite::memory:")
        .await
        .expect("open store");
    store.ensure_schema().await.expect("schema");
    for id in ["s1", "s2"] {
        store
            .upsert(
                &CandidateId::from(id),
                &RestaurantDetail::new(format!("Sqlite {}", id))
                    .with_zip_code("10001")
                    .with_coordinates(40.7, -74.0),
            )
            .await
            .expect("upsert");
    }

    let index = StaticIndex::default().with_cuisine("Italian", &["s1", "s2", "s3"]);
    let h = harness(index, store, RecordingNotifier::default());
    h.queue.send(&job_body("Italian", "a@b.com")).await.expect("send");

    let result = h.worker.handle(Invocation::Pull).await;

    assert_eq!(result.body.processed, 1);
    let body = &h.notifier.sent()[0].body;
    assert_eq!(entry_count(body), 2);
    assert!(body.contains("Coordinates: 40.7, -74"));
}

#[tokio::test]
async fn test_poller_drains_queue_until_shutdown() {
    let config = WorkerConfig::default().with_poll_interval(Duration::from_millis(10));
    let h = harness_with_config(
        StaticIndex::default().with_cuisine("Chinese", &CHINESE_IDS),
        MapStore::with_restaurants(&CHINESE_IDS),
        RecordingNotifier::default(),
        config,
    );
    for _ in 0..3 {
        h.queue.send(&job_body("Chinese", "a@b.com")).await.expect("send");
    }

    let poller = Arc::new(Poller::new(Arc::new(h.worker)));
    let shutdown = poller.shutdown_handle();
    let running = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move { poller.run().await })
    };

    for _ in 0..200 {
        if h.queue.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.send(()).expect("poller listening");

    let stats = running.await.expect("poller task");
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 0);
    assert!(stats.invocations >= 1);
    assert!(h.queue.is_empty().await);
}
