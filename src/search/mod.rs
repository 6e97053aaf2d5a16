//! Restaurant search index.
//!
//! The worker asks the index for restaurants serving a cuisine and keeps a
//! random sample of the hits:
//!
//! - **SearchIndex**: Trait for term queries returning ids in relevance order
//! - **OpenSearchClient**: HTTP backend for OpenSearch/Elasticsearch clusters
//! - **CandidateSampler**: Uniform sampling without replacement

pub mod opensearch;
pub mod sampling;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

pub use opensearch::OpenSearchClient;
pub use sampling::{CandidateSampler, DEFAULT_SAMPLE_SIZE};

/// Opaque restaurant identifier returned by the search index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A searchable restaurant index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Returns ids of restaurants matching `cuisine`, best match first.
    async fn search(&self, cuisine: &str) -> Result<Vec<CandidateId>, SearchError>;
}

/// Searches `index` for `cuisine` and samples the hits.
///
/// The query is bounded by `call_timeout`. An empty vector means the index
/// holds nothing for this cuisine.
pub async fn find_candidates(
    index: &dyn SearchIndex,
    sampler: &CandidateSampler,
    cuisine: &str,
    call_timeout: Duration,
) -> Result<Vec<CandidateId>, SearchError> {
    let hits = tokio::time::timeout(call_timeout, index.search(cuisine))
        .await
        .map_err(|_| SearchError::Timeout(call_timeout))??;

    tracing::debug!(cuisine = %cuisine, hits = hits.len(), "Search returned hits");
    Ok(sampler.sample(hits))
}
