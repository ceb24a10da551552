// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Strong types shared across blockmemo.
//!
//! - Cache addressing (partition ids, key hashes, diagnostic timestamps)
//! - Chain time
//! - Cache keywords and their canonical rendering
//! - The closed set of dispatchable operations
//! - Raw dispatch outputs

pub mod cache;
pub mod keyword;
pub mod operation;
pub mod output;
pub mod time;

pub use cache::{KeyHash, PartitionId, TimestampMillis};
pub use keyword::{cache_key, Keyword};
pub use operation::{Computation, Method, Operation, SeriesAnchor, SeriesQuery};
pub use output::{BlockResolution, BlockValue, HistoricalSeries, RawOutput, SeriesPoint};
pub use time::UnixTimestamp;
