//! Dependencies of the fulfillment worker.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::notify::Notifier;
use crate::scheduler::JobQueue;
use crate::search::{CandidateSampler, SearchIndex};
use crate::storage::RecordStore;

/// Everything the worker talks to, passed in explicitly.
///
/// Cloning is cheap; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct WorkerContext {
    /// Queue the jobs come from and are acknowledged on.
    pub queue: Arc<dyn JobQueue>,
    /// Cuisine search index.
    pub search: Arc<dyn SearchIndex>,
    /// Restaurant record store.
    pub store: Arc<dyn RecordStore>,
    /// Outbound email.
    pub notifier: Arc<dyn Notifier>,
    /// Random selection over search hits.
    pub sampler: Arc<CandidateSampler>,
    /// Timeouts, batch size and concurrency.
    pub config: WorkerConfig,
}

impl WorkerContext {
    /// Creates a context with default configuration and an unseeded sampler.
    pub fn new(
        queue: Arc<dyn JobQueue>,
        search: Arc<dyn SearchIndex>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = WorkerConfig::default();
        Self {
            queue,
            search,
            store,
            notifier,
            sampler: Arc::new(CandidateSampler::new(config.sample_size)),
            config,
        }
    }

    /// Replaces the configuration.
    ///
    /// The sampler is rebuilt for the configured sample size, so call
    /// [`Self::with_sampler`] afterwards to pin a seeded one.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        if config.sample_size != self.sampler.sample_size() {
            self.sampler = Arc::new(CandidateSampler::new(config.sample_size));
        }
        self.config = config;
        self
    }

    /// Replaces the candidate sampler.
    pub fn with_sampler(mut self, sampler: CandidateSampler) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("sample_size", &self.sampler.sample_size())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
