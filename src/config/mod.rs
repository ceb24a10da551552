// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration for blockmemo workers
//!
//! This module controls where stores live on disk, whether workers read and
//! write the cache, and the engine's retry and flush tuning.
//!
//! # Example: Using defaults
//!
//! ```rust
//! use blockmemo::EngineConfig;
//!
//! // Caching on, no reset, 3 attempts, flush every 1000 writes or 100s
//! let config = EngineConfig::default();
//! assert!(config.options.use_cache);
//! ```
//!
//! # Example: Custom configuration
//!
//! ```rust
//! use blockmemo::EngineConfigBuilder;
//! use std::time::Duration;
//!
//! let config = EngineConfigBuilder::with_defaults()
//!     .cache_dir("/var/cache/blockmemo")
//!     .max_attempts(5)
//!     .flush_interval(Duration::from_secs(30))
//!     .verbose(true)
//!     .build();
//! assert_eq!(config.retry.max_attempts, 5);
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod constants;

use constants::{
    DEFAULT_CACHE_DIR, DEFAULT_FLUSH_DIRTY_THRESHOLD, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_ATTEMPTS,
};

/// Per-worker mode flags
///
/// Part of the [`WorkerRegistry`](crate::WorkerRegistry) key: two callers
/// asking for the same partition and name with different flags get different
/// workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerOptions {
    /// Enables cache lookup and write-back
    /// Default: true
    pub use_cache: bool,

    /// Wipes the store when the worker is constructed and skips lookups
    /// Default: false
    pub reset_cache: bool,

    /// Raises hit-rate and lifecycle logging from debug to info
    /// Default: false
    pub verbose: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            reset_cache: false,
            verbose: false,
        }
    }
}

impl WorkerOptions {
    /// Options for a worker that always computes and never touches the store.
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    /// Options for a worker that wipes its store on construction.
    pub fn reset() -> Self {
        Self {
            reset_cache: true,
            ..Self::default()
        }
    }

    /// Whether lookups are allowed.
    pub fn reads_cache(&self) -> bool {
        self.use_cache && !self.reset_cache
    }
}

/// Bounded retry without backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; values below 1 behave as 1
    /// Default: 3
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Effective attempt count, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// When a worker persists its store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Flush once this many writes are pending
    /// Default: 1000
    pub dirty_threshold: usize,

    /// Flush once this much time passed since the last flush
    /// Default: 100 seconds
    pub interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            dirty_threshold: DEFAULT_FLUSH_DIRTY_THRESHOLD,
            interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl FlushPolicy {
    /// Returns `true` if `dirty` pending writes after `elapsed` require a flush.
    pub fn should_flush(&self, dirty: usize, elapsed: Duration) -> bool {
        dirty > 0 && (dirty >= self.dirty_threshold || elapsed >= self.interval)
    }
}

/// Configuration for workers and registries
///
/// Use [`EngineConfigBuilder`] for a fluent API to construct instances.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for store files: `<cache_dir>/<partition>/<name>.json`
    /// Default: `.blockmemo`
    pub cache_dir: PathBuf,

    /// Default worker flags for tasks that don't specify their own
    pub options: WorkerOptions,

    /// Retry tuning
    pub retry: RetryPolicy,

    /// Flush tuning
    pub flush: FlushPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            options: WorkerOptions::default(),
            retry: RetryPolicy::default(),
            flush: FlushPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Config rooted at `cache_dir` with every other setting at its default.
    pub fn at(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Start from [`EngineConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias of [`new`](Self::new), reads better at call sites.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Set the cache root directory.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Enable or disable cache lookup and write-back.
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.config.options.use_cache = enabled;
        self
    }

    /// Wipe stores when workers are constructed.
    pub fn reset_cache(mut self, reset: bool) -> Self {
        self.config.options.reset_cache = reset;
        self
    }

    /// Log hit rates and lifecycle events at info.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.options.verbose = verbose;
        self
    }

    /// Total attempts per cache miss.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Pending writes that force a flush.
    pub fn flush_dirty_threshold(mut self, threshold: usize) -> Self {
        self.config.flush.dirty_threshold = threshold;
        self
    }

    /// Elapsed time that forces a flush.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush.interval = interval;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert!(config.options.use_cache);
        assert!(!config.options.reset_cache);
        assert!(!config.options.verbose);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.flush.dirty_threshold, 1000);
        assert_eq!(config.flush.interval, Duration::from_secs(100));
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfigBuilder::new()
            .cache_dir("/tmp/memo")
            .use_cache(false)
            .reset_cache(true)
            .verbose(true)
            .max_attempts(7)
            .flush_dirty_threshold(10)
            .flush_interval(Duration::from_secs(1))
            .build();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/memo"));
        assert!(!config.options.use_cache);
        assert!(config.options.reset_cache);
        assert!(config.options.verbose);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.flush.dirty_threshold, 10);
        assert_eq!(config.flush.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_reads_cache() {
        assert!(WorkerOptions::default().reads_cache());
        assert!(!WorkerOptions::uncached().reads_cache());
        assert!(!WorkerOptions::reset().reads_cache());
    }

    #[test]
    fn test_zero_attempts_behaves_as_one() {
        let policy = RetryPolicy { max_attempts: 0 };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_flush_policy_thresholds() {
        let policy = FlushPolicy::default();
        assert!(!policy.should_flush(0, Duration::from_secs(500)));
        assert!(!policy.should_flush(999, Duration::from_secs(99)));
        assert!(policy.should_flush(1000, Duration::ZERO));
        assert!(policy.should_flush(1, Duration::from_secs(100)));
    }
}
