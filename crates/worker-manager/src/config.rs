//! Worker manager configuration
//!
//! Built directly with the `with_*` builder methods, deserialized (durations
//! as milliseconds), or loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerManagerError};

/// Default number of workers
pub const DEFAULT_NUM_WORKERS: usize = 10;

/// Default queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Largest accepted queue capacity
pub const MAX_QUEUE_SIZE: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Default worker name prefix; workers are named `{prefix}-{index}`
pub const DEFAULT_WORKER_PREFIX: &str = "worker";

/// Configuration for a [`WorkerManager`](crate::WorkerManager)
///
/// # Example
///
/// ```
/// use async_worker_manager::WorkerManagerConfig;
/// use std::time::Duration;
///
/// let config = WorkerManagerConfig::new()
///     .with_num_workers(4)
///     .with_queue_size(16)
///     .with_timeout(Duration::from_millis(500));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerManagerConfig {
    /// Number of concurrent workers
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Maximum number of queued tasks
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Per-task handler deadline (None = disabled)
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,

    /// Prefix for worker names in log records
    #[serde(default = "default_worker_prefix")]
    pub worker_prefix: String,
}

fn default_num_workers() -> usize {
    DEFAULT_NUM_WORKERS
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_worker_prefix() -> String {
    DEFAULT_WORKER_PREFIX.to_string()
}

impl Default for WorkerManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            queue_size: default_queue_size(),
            timeout: None,
            worker_prefix: default_worker_prefix(),
        }
    }
}

impl WorkerManagerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the queue capacity
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set the per-task timeout; a zero duration disables it
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Disable the per-task timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the worker name prefix
    pub fn with_worker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_prefix = prefix.into();
        self
    }

    /// Effective timeout, treating a zero duration as disabled
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|timeout| !timeout.is_zero())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(WorkerManagerError::config("num_workers must be at least 1"));
        }
        if self.queue_size == 0 {
            return Err(WorkerManagerError::config("queue_size must be at least 1"));
        }
        if self.queue_size > MAX_QUEUE_SIZE {
            return Err(WorkerManagerError::config(format!(
                "queue_size must be at most {MAX_QUEUE_SIZE}"
            )));
        }
        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables (all optional, defaults as in [`Default`]):
    /// - `WORKER_MANAGER_NUM_WORKERS`: number of workers
    /// - `WORKER_MANAGER_QUEUE_SIZE`: queue capacity
    /// - `WORKER_MANAGER_TIMEOUT_MS`: per-task timeout in milliseconds (0 disables)
    /// - `WORKER_MANAGER_WORKER_PREFIX`: worker name prefix
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(num_workers) = parse_env("WORKER_MANAGER_NUM_WORKERS")? {
            config.num_workers = num_workers;
        }
        if let Some(queue_size) = parse_env("WORKER_MANAGER_QUEUE_SIZE")? {
            config.queue_size = queue_size;
        }
        if let Some(millis) = parse_env::<u64>("WORKER_MANAGER_TIMEOUT_MS")? {
            config = config.with_timeout(Duration::from_millis(millis));
        }
        if let Ok(prefix) = env::var("WORKER_MANAGER_WORKER_PREFIX") {
            config.worker_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_env<V>(name: &str) -> Result<Option<V>>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| WorkerManagerError::config(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Serde support for Option<Duration> as milliseconds
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}
