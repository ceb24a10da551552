// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Engine constants
//!
//! Centralizes the defaults used by workers and stores so they are easy to
//! find. Every value here can be overridden through
//! [`EngineConfigBuilder`](crate::EngineConfigBuilder).

use std::time::Duration;

/// Total attempts (initial + retries) a worker makes on a cache miss.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Dirty entries that force a flush.
pub const DEFAULT_FLUSH_DIRTY_THRESHOLD: usize = 1000;

/// Elapsed time since the last flush that forces a flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(100);

/// Current on-disk store format version.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Flush timestamps retained in a store file for diagnostics.
pub const FLUSH_HISTORY_LIMIT: usize = 100;

/// File extension of store files.
pub const STORE_FILE_EXTENSION: &str = "json";

/// Default cache root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".blockmemo";
