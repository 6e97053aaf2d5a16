//! Long-running pull loop.
//!
//! Repeats pull invocations until a shutdown signal arrives. An empty or
//! failed receive is followed by a pause of `poll_interval`; a non-empty
//! batch is followed immediately by the next receive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::fulfillment::FulfillmentWorker;

/// Totals accumulated by a [`Poller`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Pull invocations made.
    pub invocations: u64,
    /// Jobs whose email was sent.
    pub processed: u64,
    /// Jobs that failed.
    pub failed: u64,
    /// Jobs deferred for lack of time.
    pub deferred: u64,
    /// Receives that failed outright.
    pub receive_errors: u64,
}

impl PollerStats {
    /// Returns the share of attempted jobs that were delivered, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.processed + self.failed;
        if total == 0 {
            return 0.0;
        }
        (self.processed as f64 / total as f64) * 100.0
    }
}

#[derive(Default)]
struct SharedPollerStats {
    invocations: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    deferred: AtomicU64,
    receive_errors: AtomicU64,
}

impl SharedPollerStats {
    fn snapshot(&self) -> PollerStats {
        PollerStats {
            invocations: self.invocations.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            deferred: self.deferred.load(Ordering::SeqCst),
            receive_errors: self.receive_errors.load(Ordering::SeqCst),
        }
    }
}

/// Drives a [`FulfillmentWorker`] in pull mode until shut down.
pub struct Poller {
    worker: Arc<FulfillmentWorker>,
    shutdown_tx: broadcast::Sender<()>,
    stats: Arc<SharedPollerStats>,
}

impl Poller {
    /// Creates a poller for `worker`.
    pub fn new(worker: Arc<FulfillmentWorker>) -> Self {
        // Only ever sent once.
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker,
            shutdown_tx,
            stats: Arc::new(SharedPollerStats::default()),
        }
    }

    /// Returns a handle that stops the loop when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Returns the totals so far.
    pub fn stats(&self) -> PollerStats {
        self.stats.snapshot()
    }

    /// Runs pull invocations until shutdown and returns the final totals.
    ///
    /// The batch in progress is always finished before the loop exits.
    pub async fn run(&self) -> PollerStats {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let config = &self.worker.context().config;
        info!(
            batch_size = config.batch_size,
            poll_interval_secs = config.poll_interval.as_secs(),
            "Poller started"
        );

        loop {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => break,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            let deadline = config.invocation_budget.map(|b| Instant::now() + b);
            self.stats.invocations.fetch_add(1, Ordering::SeqCst);

            let idle = match self.worker.pull_batch(deadline).await {
                Ok(report) => {
                    self.stats
                        .processed
                        .fetch_add(u64::from(report.processed), Ordering::SeqCst);
                    self.stats
                        .failed
                        .fetch_add(u64::from(report.failed), Ordering::SeqCst);
                    self.stats
                        .deferred
                        .fetch_add(u64::from(report.deferred), Ordering::SeqCst);
                    report.received == 0
                }
                Err(e) => {
                    self.stats.receive_errors.fetch_add(1, Ordering::SeqCst);
                    warn!(error = %e, "Pull invocation failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
        }

        let stats = self.stats();
        info!(
            invocations = stats.invocations,
            processed = stats.processed,
            failed = stats.failed,
            "Poller stopped"
        );
        stats
    }
}
