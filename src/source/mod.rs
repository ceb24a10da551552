// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Remote data/compute boundary
//!
//! A [`CacheWorker`](crate::CacheWorker) never talks to a chain directly. On a
//! cache miss it dispatches to a [`ChainDataSource`], which is where state
//! queries, cross-computation calls and time-to-block resolution actually
//! happen.
//!
//! # Architecture
//!
//! - [`ChainDataSource`] - what a worker can ask for
//! - [`PartitionContext`] - a partition id paired with the source that serves it
//! - [`ProviderDataSource`] - an alloy [`Provider`](alloy_provider::Provider)
//!   implementation with pluggable [`BlockComputation`]s
//!
//! # Example: Implementing ChainDataSource
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use blockmemo::{BlockResolution, ChainDataSource, Computation, SourceError, UnixTimestamp};
//!
//! struct Archive { /* ... */ }
//!
//! #[async_trait]
//! impl ChainDataSource for Archive {
//!     async fn block_at_or_before(&self, ts: UnixTimestamp) -> Result<BlockResolution, SourceError> {
//!         self.lookup(ts).await
//!     }
//!
//!     async fn run_at_block(&self, c: &Computation, block: u64) -> Result<serde_json::Value, SourceError> {
//!         self.call(&c.name, &c.params, block).await
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "Archive"
//!     }
//! }
//! ```

use alloy_primitives::BlockNumber;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::errors::SourceError;
use crate::types::{
    BlockResolution, Computation, HistoricalSeries, PartitionId, SeriesPoint, SeriesQuery,
    UnixTimestamp,
};

mod provider;

pub use provider::{BlockComputation, BlockHeaderComputation, ProviderDataSource};

/// The remote collaborator a worker dispatches to on a cache miss
///
/// Calls are treated as opaque and deterministic for a given input: the
/// worker caches whatever they return.
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Resolves `timestamp` to the latest block at or before it.
    async fn block_at_or_before(
        &self,
        timestamp: UnixTimestamp,
    ) -> Result<BlockResolution, SourceError>;

    /// Runs a named computation at a specific block.
    async fn run_at_block(
        &self,
        computation: &Computation,
        block_number: BlockNumber,
    ) -> Result<Value, SourceError>;

    /// Samples a window ending at the query's anchor.
    ///
    /// The default resolves every sample time with
    /// [`block_at_or_before`](Self::block_at_or_before) and, when the query
    /// names a computation, runs it at each resolved block. Sources with a
    /// native series endpoint should override this.
    async fn run_historical_series(
        &self,
        query: &SeriesQuery,
    ) -> Result<HistoricalSeries, SourceError> {
        let mut points = Vec::new();
        for sample_timestamp in query.sample_times()? {
            let block = self.block_at_or_before(sample_timestamp).await?;
            let output = match &query.computation {
                Some(computation) => Some(self.run_at_block(computation, block.block_number).await?),
                None => None,
            };
            points.push(SeriesPoint {
                sample_timestamp,
                block_number: block.block_number,
                block_timestamp: block.block_timestamp,
                output,
            });
        }
        Ok(HistoricalSeries { points })
    }

    /// Returns a human-readable name for this source, used for logging.
    fn name(&self) -> &'static str;
}

/// A partition id paired with the source that serves it
///
/// This is what a task needs to open its own worker.
#[derive(Clone)]
pub struct PartitionContext {
    partition: PartitionId,
    source: Arc<dyn ChainDataSource>,
}

impl PartitionContext {
    pub fn new(partition: PartitionId, source: Arc<dyn ChainDataSource>) -> Self {
        Self { partition, source }
    }

    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    pub fn source(&self) -> &Arc<dyn ChainDataSource> {
        &self.source
    }
}

impl fmt::Debug for PartitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionContext")
            .field("partition", &self.partition)
            .field("source", &self.source.name())
            .finish()
    }
}
