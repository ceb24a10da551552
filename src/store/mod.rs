// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed cache storage
//!
//! One [`CacheStore`] per `(partition, logical name)` pair, holding
//! [`CacheEntry`] values addressed by `(partition, method, key hash)`.
//! Stores buffer writes in memory; the owning
//! [`CacheWorker`](crate::CacheWorker) decides when to flush.

mod disk;
mod entry;

pub use disk::CacheStore;
pub use entry::CacheEntry;
