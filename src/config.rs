//! Configuration for the fulfillment worker and its collaborators.
//!
//! Every section has sensible defaults, `with_*` builders and a `from_env`
//! constructor. CLI flags are layered on top in [`crate::cli`].

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Tuning for a single worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of messages requested per pull receive.
    pub batch_size: usize,
    /// How long a received message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// Upper bound applied to every network call.
    pub call_timeout: Duration,
    /// Number of jobs processed at the same time within a batch.
    pub concurrency: usize,
    /// Number of candidates kept after sampling the search hits.
    pub sample_size: usize,
    /// Wall-clock budget of one invocation, if the host imposes one.
    pub invocation_budget: Option<Duration>,
    /// Jobs are not started once less than this much budget remains.
    pub deadline_margin: Duration,
    /// Delay between pull invocations in polling mode.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            concurrency: 1,
            sample_size: 5,
            invocation_budget: None,
            deadline_margin: Duration::from_secs(5),
            poll_interval: Duration::from_secs(20),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DINING_BATCH_SIZE`: Messages per receive (default: 10)
    /// - `DINING_VISIBILITY_TIMEOUT_SECS`: Visibility timeout (default: 30)
    /// - `DINING_CALL_TIMEOUT_SECS`: Per-call timeout (default: 10)
    /// - `DINING_CONCURRENCY`: Jobs processed in parallel (default: 1)
    /// - `DINING_SAMPLE_SIZE`: Restaurants per email (default: 5)
    /// - `DINING_INVOCATION_BUDGET_SECS`: Invocation budget (default: unbounded)
    /// - `DINING_DEADLINE_MARGIN_SECS`: Safety margin before the budget ends (default: 5)
    /// - `DINING_POLL_INTERVAL_SECS`: Delay between polls (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DINING_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "DINING_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("DINING_VISIBILITY_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "DINING_VISIBILITY_TIMEOUT_SECS")?;
            config.visibility_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("DINING_CALL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "DINING_CALL_TIMEOUT_SECS")?;
            config.call_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("DINING_CONCURRENCY") {
            config.concurrency = parse_env_value(&val, "DINING_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("DINING_SAMPLE_SIZE") {
            config.sample_size = parse_env_value(&val, "DINING_SAMPLE_SIZE")?;
        }

        if let Ok(val) = std::env::var("DINING_INVOCATION_BUDGET_SECS") {
            let secs: u64 = parse_env_value(&val, "DINING_INVOCATION_BUDGET_SECS")?;
            config.invocation_budget = Some(Duration::from_secs(secs));
        }

        if let Ok(val) = std::env::var("DINING_DEADLINE_MARGIN_SECS") {
            let secs: u64 = parse_env_value(&val, "DINING_DEADLINE_MARGIN_SECS")?;
            config.deadline_margin = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("DINING_POLL_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "DINING_POLL_INTERVAL_SECS")?;
            config.poll_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        if self.sample_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "sample_size must be greater than 0".to_string(),
            ));
        }

        if self.call_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "call_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the receive batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets how many jobs are processed at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the candidate sample size.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Sets the invocation budget.
    pub fn with_invocation_budget(mut self, budget: Duration) -> Self {
        self.invocation_budget = Some(budget);
        self
    }

    /// Sets the deadline safety margin.
    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Connection settings for the restaurant search index.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the search cluster, e.g. `https://search.example.com`.
    pub endpoint: String,
    /// Index holding one document per restaurant/cuisine pair.
    pub index: String,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Maximum hits requested per query.
    pub max_hits: usize,
    /// Document field matched against the requested cuisine.
    pub cuisine_field: String,
    /// Document field carrying the restaurant identifier.
    pub id_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: "restaurants".to_string(),
            username: None,
            password: None,
            max_hits: 100,
            cuisine_field: "Cuisine".to_string(),
            id_field: "RestaurantID".to_string(),
        }
    }
}

impl SearchConfig {
    /// Reads `DINING_SEARCH_ENDPOINT` (required), `DINING_SEARCH_INDEX`,
    /// `DINING_SEARCH_USER`, `DINING_SEARCH_PASSWORD` and `DINING_SEARCH_MAX_HITS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            endpoint: std::env::var("DINING_SEARCH_ENDPOINT")
                .map_err(|_| ConfigError::MissingEnvVar("DINING_SEARCH_ENDPOINT".to_string()))?,
            ..Self::default()
        };

        if let Ok(val) = std::env::var("DINING_SEARCH_INDEX") {
            config.index = val;
        }
        config.username = std::env::var("DINING_SEARCH_USER").ok();
        config.password = std::env::var("DINING_SEARCH_PASSWORD").ok();

        if let Ok(val) = std::env::var("DINING_SEARCH_MAX_HITS") {
            config.max_hits = parse_env_value(&val, "DINING_SEARCH_MAX_HITS")?;
        }

        Ok(config)
    }

    /// Sets basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the index name.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Sets the maximum hits per query.
    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }
}

/// Settings for the outbound email relay.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay endpoint accepting JSON send requests. `None` logs instead of sending.
    pub endpoint: Option<String>,
    /// Bearer token for the relay.
    pub api_key: Option<String>,
    /// Sender address.
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from_address: "concierge@localhost".to_string(),
        }
    }
}

impl EmailConfig {
    /// Reads `DINING_EMAIL_ENDPOINT`, `DINING_EMAIL_API_KEY` and `DINING_EMAIL_FROM`.
    pub fn from_env() -> Self {
        let mut config = Self {
            endpoint: std::env::var("DINING_EMAIL_ENDPOINT").ok(),
            api_key: std::env::var("DINING_EMAIL_API_KEY").ok(),
            ..Self::default()
        };
        if let Ok(val) = std::env::var("DINING_EMAIL_FROM") {
            config.from_address = val;
        }
        config
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
