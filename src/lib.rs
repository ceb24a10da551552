// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! # blockmemo
//!
//! A disk-persisted memoizing executor for deterministic, expensive chain
//! queries: time-to-block resolution, per-block computations and historical
//! series.
//!
//! - [`CacheStore`] - versioned JSON store, one file per partition and name
//! - [`WorkRequest`] - one cacheable unit of work and its cache keywords
//! - [`CacheWorker`] - cache check, bounded retries, write-back, flushing
//! - [`WorkerRegistry`] - shared workers deduplicated by partition, name and flags
//! - [`Task`] - composable higher-level work built on cooked requests
//!
//! Remote data and computation sit behind [`ChainDataSource`];
//! [`ProviderDataSource`] implements it on top of an alloy provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use blockmemo::{
//!     EngineConfig, PartitionContext, PartitionId, ProviderDataSource, ResolveTimeToBlock,
//!     Task, WorkerAcquisition, WorkerRegistry,
//! };
//! use alloy_chains::NamedChain;
//! use std::sync::Arc;
//!
//! let source = Arc::new(ProviderDataSource::new(provider));
//! let context = PartitionContext::new(PartitionId::from(NamedChain::Mainnet), source);
//! let registry = Arc::new(WorkerRegistry::new(EngineConfig::default()));
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 10, 10).unwrap();
//! let mut task = Task::new(
//!     ResolveTimeToBlock::for_date(date)?,
//!     WorkerAcquisition::shared(registry.clone(), context),
//! );
//! let block = task.execute().await?;
//! println!("{} -> block {}", block.timestamp, block.block_number);
//!
//! registry.flush_all().await?;
//! ```

pub mod config;
pub mod errors;
mod registry;
mod request;
mod source;
mod store;
mod task;
mod tracing;
pub mod types;
mod worker;

pub use config::{EngineConfig, EngineConfigBuilder, FlushPolicy, RetryPolicy, WorkerOptions};
pub use errors::{BlockMemoError, CacheStoreError, CookError, RpcError, SourceError, TaskError};
pub use registry::WorkerRegistry;
pub use request::{
    CachePayload, CookContext, ErrorHandler, RawResult, Recovery, Shaper, WorkRequest,
};
pub use source::{
    BlockComputation, BlockHeaderComputation, ChainDataSource, PartitionContext,
    ProviderDataSource,
};
pub use store::{CacheEntry, CacheStore};
pub use task::{
    BlockRangeRow, BlockRangeTable, BlockSeries, BlockSeriesPoint, DeriveReturnSeries,
    ResolveHistoricalBlockRange, ResolveTimeToBlock, ReturnPoint, ReturnSeries, ReturnVariant,
    RunAtHistoricalBlocks, Task, TaskContext, TaskDefinition, TimedBlock, WorkerAcquisition,
};
pub use types::{
    cache_key, BlockResolution, BlockValue, Computation, HistoricalSeries, KeyHash, Keyword,
    Method, Operation, PartitionId, RawOutput, SeriesAnchor, SeriesPoint, SeriesQuery,
    TimestampMillis, UnixTimestamp,
};
pub use worker::{CacheWorker, WorkerStats};
