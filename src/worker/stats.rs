// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for one [`CacheWorker`](super::CacheWorker)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Verified cache hits
    pub hits: u64,
    /// Requests that had to be dispatched
    pub misses: u64,
    /// Dispatch attempts, including retries
    pub attempts: u64,
    /// Calls into the data source that returned successfully
    pub dispatches: u64,
    /// Entries written to the store
    pub writes: u64,
    /// Flushes to disk
    pub flushes: u64,
}

impl WorkerStats {
    /// Calculates the cache hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for WorkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={}, misses={}, attempts={}, dispatches={}, writes={}, flushes={}, hit_rate={:.1}%",
            self.hits,
            self.misses,
            self.attempts,
            self.dispatches,
            self.writes,
            self.flushes,
            self.hit_rate()
        )
    }
}
