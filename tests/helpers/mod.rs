// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Test helpers for blockmemo integration tests
//!
//! Provides a mock [`ChainDataSource`] over a synthetic chain so workers and
//! tasks can be tested without a real RPC endpoint.

#![allow(dead_code)]

use alloy_primitives::BlockNumber;
use async_trait::async_trait;
use blockmemo::{
    BlockResolution, ChainDataSource, Computation, EngineConfig, HistoricalSeries,
    PartitionContext, PartitionId, SeriesPoint, SeriesQuery, SourceError, UnixTimestamp,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Timestamp of block 0
pub const GENESIS: i64 = 1_600_000_000;
/// Seconds between blocks
pub const BLOCK_TIME: i64 = 12;
/// Latest block of the synthetic chain
pub const HEAD: BlockNumber = 100_000_000;

pub fn block_timestamp(block: BlockNumber) -> UnixTimestamp {
    UnixTimestamp(GENESIS + BLOCK_TIME * block as i64)
}

/// Mock data source over a chain where block `n` is mined at
/// `GENESIS + 12 * n`
///
/// Computations:
/// - `block.number` returns the block number
/// - `price.usd` returns `{"usd": n / 100}`
/// - anything else is rejected
///
/// # Example
///
/// ```rust,ignore
/// let source = MockChainSource::new()
///     .fail_next(2)
///     .with_missing_blocks([200]);
/// let context = helpers::context(Arc::new(source));
/// ```
#[derive(Default)]
pub struct MockChainSource {
    transient_failures: AtomicU32,
    missing_blocks: HashSet<BlockNumber>,
    delay: Option<Duration>,
    time_to_block_calls: AtomicU32,
    series_calls: AtomicU32,
    run_at_block_calls: Mutex<HashMap<BlockNumber, u32>>,
}

impl MockChainSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls (of any kind) with a transient error.
    pub fn fail_next(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Report missing data for these blocks.
    pub fn with_missing_blocks(mut self, blocks: impl IntoIterator<Item = BlockNumber>) -> Self {
        self.missing_blocks.extend(blocks);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn time_to_block_calls(&self) -> u32 {
        self.time_to_block_calls.load(Ordering::SeqCst)
    }

    pub fn series_calls(&self) -> u32 {
        self.series_calls.load(Ordering::SeqCst)
    }

    pub fn run_at_block_calls(&self) -> u32 {
        self.run_at_block_calls.lock().unwrap().values().sum()
    }

    pub fn run_at_block_calls_for(&self, block: BlockNumber) -> u32 {
        self.run_at_block_calls
            .lock()
            .unwrap()
            .get(&block)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.time_to_block_calls() + self.series_calls() + self.run_at_block_calls()
    }

    async fn enter(&self) -> Result<(), SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::transient(format!(
                "scripted failure ({remaining} left)"
            )));
        }
        Ok(())
    }

    fn resolve(timestamp: UnixTimestamp) -> Result<BlockResolution, SourceError> {
        if timestamp.0 < GENESIS {
            return Err(SourceError::data_unavailable(format!(
                "{timestamp} is before genesis"
            )));
        }
        let block_number = (((timestamp.0 - GENESIS) / BLOCK_TIME) as u64).min(HEAD);
        Ok(BlockResolution {
            block_number,
            block_timestamp: block_timestamp(block_number),
        })
    }

    fn compute(&self, computation: &Computation, block: BlockNumber) -> Result<Value, SourceError> {
        if self.missing_blocks.contains(&block) {
            return Err(SourceError::data_unavailable(format!("no data at block {block}")));
        }
        match computation.name.as_str() {
            "block.number" => Ok(Value::from(block)),
            "price.usd" => Ok(serde_json::json!({ "usd": block as f64 / 100.0 })),
            other => Err(SourceError::UnknownComputation {
                name: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ChainDataSource for MockChainSource {
    async fn block_at_or_before(
        &self,
        timestamp: UnixTimestamp,
    ) -> Result<BlockResolution, SourceError> {
        self.time_to_block_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Self::resolve(timestamp)
    }

    async fn run_at_block(
        &self,
        computation: &Computation,
        block_number: BlockNumber,
    ) -> Result<Value, SourceError> {
        *self
            .run_at_block_calls
            .lock()
            .unwrap()
            .entry(block_number)
            .or_default() += 1;
        self.enter().await?;
        self.compute(computation, block_number)
    }

    async fn run_historical_series(
        &self,
        query: &SeriesQuery,
    ) -> Result<HistoricalSeries, SourceError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let mut points = Vec::new();
        for sample_timestamp in query.sample_times()? {
            let block = Self::resolve(sample_timestamp)?;
            let output = match &query.computation {
                Some(computation) => Some(self.compute(computation, block.block_number)?),
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

    fn name(&self) -> &'static str {
        "MockChainSource"
    }
}

pub fn partition() -> PartitionId {
    PartitionId::new("testnet").unwrap()
}

pub fn context(source: Arc<MockChainSource>) -> PartitionContext {
    PartitionContext::new(partition(), source)
}

pub fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig::at(dir.path())
}

/// Installs a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
