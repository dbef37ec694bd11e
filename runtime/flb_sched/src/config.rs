//! Scheduler configuration.

use std::num::NonZeroUsize;

/// Environment variable overriding [`SchedulerConfig::workers`].
pub const WORKERS_ENV: &str = "FLB_WORKERS";

/// Environment variable overriding [`SchedulerConfig::max_inline_depth`].
pub const INLINE_DEPTH_ENV: &str = "FLB_MAX_INLINE_DEPTH";

/// Settings for a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads in the pool.
    pub workers: usize,
    /// How many continuations a thread may run nested inside one another
    /// before further ones are handed back to the pool.
    pub max_inline_depth: usize,
    /// Stack size of each worker thread, in bytes.
    pub stack_size: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            workers: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            max_inline_depth: 10,
            // Lookups and frame construction nest continuations up to the
            // inline bound; debug builds need room for that on top of tracing.
            stack_size: 32 * 1024 * 1024,
            thread_name_prefix: "flb-worker".to_owned(),
        }
    }
}

impl SchedulerConfig {
    /// Defaults with `FLB_WORKERS` / `FLB_MAX_INLINE_DEPTH` applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Malformed values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(workers) = parse_override(WORKERS_ENV, lookup(WORKERS_ENV)) {
            if workers > 0 {
                self.workers = workers;
            } else {
                tracing::warn!("{WORKERS_ENV} must be positive; keeping {}", self.workers);
            }
        }
        if let Some(depth) = parse_override(INLINE_DEPTH_ENV, lookup(INLINE_DEPTH_ENV)) {
            self.max_inline_depth = depth;
        }
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn max_inline_depth(mut self, depth: usize) -> Self {
        self.max_inline_depth = depth;
        self
    }
}

fn parse_override(key: &str, raw: Option<String>) -> Option<usize> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}
