//! Uniform candidate sampling.
//!
//! Search hits are sampled rather than truncated so that repeated requests
//! for the same cuisine spread recommendations across the whole hit set.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::CandidateId;

/// Default number of candidates kept per job.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Samples candidates uniformly without replacement.
///
/// The random source is owned by the sampler so tests can pin it with
/// [`CandidateSampler::with_seed`].
#[derive(Debug)]
pub struct CandidateSampler {
    sample_size: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl Default for CandidateSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl CandidateSampler {
    /// Creates a sampler seeded from OS entropy.
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            rng: Mutex::new(ChaCha8Rng::from_rng(&mut rand::rng())),
        }
    }

    /// Creates a deterministic sampler.
    pub fn with_seed(sample_size: usize, seed: u64) -> Self {
        Self {
            sample_size,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Returns the maximum sample size.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Draws `min(sample_size, distinct hits)` candidates.
    ///
    /// Duplicate ids in the hit list are collapsed first, so the result never
    /// repeats a restaurant.
    pub fn sample(&self, hits: Vec<CandidateId>) -> Vec<CandidateId> {
        let mut seen = HashSet::with_capacity(hits.len());
        let mut pool: Vec<CandidateId> = hits
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if pool.len() <= 1 || self.sample_size == 0 {
            pool.truncate(self.sample_size);
            return pool;
        }

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pool.shuffle(&mut *rng);
        pool.truncate(self.sample_size);
        pool
    }
}
