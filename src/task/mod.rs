// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Composable tasks
//!
//! A [`Task`] runs a [`TaskDefinition`] against a [`CacheWorker`] it
//! acquires in one of three ways ([`WorkerAcquisition`]). Definitions cook
//! [`WorkRequest`]s and may run child tasks, which inherit the parent's
//! worker.
//!
//! Built-in definitions compose into a chain from calendar time to derived
//! per-block values:
//!
//! - [`ResolveTimeToBlock`] - timestamp (or date) to block
//! - [`ResolveHistoricalBlockRange`] - a window of sampled blocks ending at a
//!   resolved block
//! - [`RunAtHistoricalBlocks`] - a computation at every block of a range
//! - [`DeriveReturnSeries`] - latest value or rolling ratios of those values
//!
//! # Example
//!
//! ```rust,ignore
//! use blockmemo::{
//!     Computation, DeriveReturnSeries, ResolveHistoricalBlockRange, ReturnVariant,
//!     RunAtHistoricalBlocks, Task, UnixTimestamp, WorkerAcquisition,
//! };
//!
//! let range = ResolveHistoricalBlockRange::new(UnixTimestamp::now(), 30 * 86_400, 86_400)?;
//! let prices = RunAtHistoricalBlocks::new(range, Computation::new("price.usd").with_param("token", weth));
//! let returns = DeriveReturnSeries::new(prices, ReturnVariant::Rolling { lag: 1 })?;
//!
//! let mut task = Task::new(returns, WorkerAcquisition::shared(registry, context));
//! let series = task.execute().await?;
//! ```
//!
//! [`CacheWorker`]: crate::CacheWorker
//! [`WorkRequest`]: crate::WorkRequest

mod block_range;
mod return_series;
mod run_at_blocks;
mod runner;
mod time_to_block;

pub use block_range::{BlockRangeRow, BlockRangeTable, ResolveHistoricalBlockRange};
pub use return_series::{DeriveReturnSeries, ReturnPoint, ReturnSeries, ReturnVariant};
pub use run_at_blocks::{BlockSeries, BlockSeriesPoint, RunAtHistoricalBlocks};
pub use runner::{Task, TaskContext, TaskDefinition, WorkerAcquisition};
pub use time_to_block::{ResolveTimeToBlock, TimedBlock};
