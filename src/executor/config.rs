//! Executor configuration.

use serde::{Deserialize, Serialize};

/// Executor configuration.
///
/// Deserializes from a partial document; missing fields take their defaults.
///
/// # Example
/// ```
/// use joinery::ExecutorConfig;
///
/// let config: ExecutorConfig = serde_json::from_str(r#"{"parallel_fetch": true}"#).unwrap();
/// assert!(config.parallel_fetch);
/// assert_eq!(config.fetch_workers, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Fetch distinct namespaces concurrently on a worker pool.
    pub parallel_fetch: bool,
    /// Number of fetch workers when `parallel_fetch` is set.
    pub fetch_workers: usize,
    /// Maximum queued fetch jobs. Submitting to a full queue waits for a
    /// free slot unless `reject_when_full` is set.
    pub queue_capacity: usize,
    /// Fail a call with `ExecutionError::QueueFull` instead of waiting when
    /// the fetch queue is full.
    pub reject_when_full: bool,
    /// Split a namespace's key set into fetches of at most this many keys.
    pub fetch_batch_size: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_fetch: false,
            fetch_workers: 4,
            queue_capacity: 256,
            reject_when_full: false,
            fetch_batch_size: None,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub const fn parallel_fetch(mut self, enabled: bool) -> Self {
        self.parallel_fetch = enabled;
        self
    }

    #[must_use]
    pub const fn fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers;
        self
    }

    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn reject_when_full(mut self, enabled: bool) -> Self {
        self.reject_when_full = enabled;
        self
    }

    /// Limits the number of keys per fetch; `0` is treated as no limit.
    #[must_use]
    pub const fn fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = if size == 0 { None } else { Some(size) };
        self
    }
}
