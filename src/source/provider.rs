// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! [`ChainDataSource`] backed by an alloy provider
//!
//! Time-to-block resolution uses binary search over block timestamps, so it
//! costs O(log n) `eth_getBlockByNumber` calls per lookup. That cost is the
//! reason these lookups are worth caching at all.

use alloy_primitives::BlockNumber;
use alloy_provider::Provider;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, Instrument};

use super::ChainDataSource;
use crate::errors::{RpcError, SourceError};
use crate::tracing::spans;
use crate::types::{BlockResolution, Computation, UnixTimestamp};

/// A named computation a [`ProviderDataSource`] can run at a block
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use blockmemo::{BlockComputation, SourceError};
///
/// struct NativeBalance;
///
/// #[async_trait]
/// impl<P: Provider> BlockComputation<P> for NativeBalance {
///     fn name(&self) -> &'static str {
///         "account.native-balance"
///     }
///
///     async fn run(&self, provider: &P, block: u64, params: &BTreeMap<String, Value>)
///         -> Result<Value, SourceError>
///     {
///         let holder = params.get("holder").and_then(Value::as_str)
///             .ok_or_else(|| SourceError::compute_rejected("missing holder"))?;
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait BlockComputation<P>: Send + Sync {
    /// Name requests use to select this computation.
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        provider: &P,
        block_number: BlockNumber,
        params: &BTreeMap<String, Value>,
    ) -> Result<Value, SourceError>;
}

/// Built-in `block.header` computation: number, timestamp and hash of a block
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHeaderComputation;

#[async_trait]
impl<P: Provider> BlockComputation<P> for BlockHeaderComputation {
    fn name(&self) -> &'static str {
        "block.header"
    }

    async fn run(
        &self,
        provider: &P,
        block_number: BlockNumber,
        _params: &BTreeMap<String, Value>,
    ) -> Result<Value, SourceError> {
        let block = provider
            .get_block_by_number(block_number.into())
            .await
            .map_err(|e| RpcError::get_block_failed(block_number, e))?
            .ok_or(RpcError::BlockNotFound { block_number })?;

        Ok(json!({
            "number": block_number,
            "timestamp": block.header.timestamp,
            "hash": block.header.hash.to_string(),
        }))
    }
}

/// Binary search for the last block with timestamp <= `target_ts`
///
/// Returns `None` when even block 0 is later than the target.
///
/// # Algorithm
///
/// - **Search space**: [0, latest_block]
/// - **Invariant**: All blocks < lo have timestamp <= target_ts (or unknown)
/// - **Invariant**: All blocks > hi have timestamp > target_ts
/// - **Result**: The largest block number with timestamp <= target_ts
pub(crate) async fn find_last_block_at_or_before<F, Fut>(
    target_ts: UnixTimestamp,
    latest_block: BlockNumber,
    mut block_timestamp: F,
) -> Result<Option<BlockResolution>, SourceError>
where
    F: FnMut(BlockNumber) -> Fut,
    Fut: Future<Output = Result<UnixTimestamp, SourceError>>,
{
    let mut lo = 0u64;
    let mut hi = latest_block;
    let mut result: Option<BlockResolution> = None;

    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let ts = block_timestamp(mid).await?;

        if ts <= target_ts {
            // Candidate; keep looking right for later blocks that also qualify
            result = Some(BlockResolution {
                block_number: mid,
                block_timestamp: ts,
            });
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }

    debug!(target_ts = %target_ts, result = ?result.map(|r| r.block_number), "Found last block at or before timestamp");
    Ok(result)
}

/// Alloy-provider backed data source
///
/// # Examples
///
/// ```rust,ignore
/// use alloy_provider::ProviderBuilder;
/// use blockmemo::{BlockHeaderComputation, ProviderDataSource};
///
/// let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?);
/// let source = ProviderDataSource::new(provider)
///     .with_computation(MyPoolTvl);
/// ```
pub struct ProviderDataSource<P> {
    provider: P,
    computations: HashMap<&'static str, Arc<dyn BlockComputation<P>>>,
}

impl<P: Provider + 'static> ProviderDataSource<P> {
    /// Creates a source with the built-in `block.header` computation registered.
    pub fn new(provider: P) -> Self {
        let mut source = Self {
            provider,
            computations: HashMap::new(),
        };
        source.register(BlockHeaderComputation);
        source
    }

    /// Registers a computation, replacing any with the same name.
    pub fn register(&mut self, computation: impl BlockComputation<P> + 'static) {
        let computation: Arc<dyn BlockComputation<P>> = Arc::new(computation);
        self.computations.insert(computation.name(), computation);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_computation(mut self, computation: impl BlockComputation<P> + 'static) -> Self {
        self.register(computation);
        self
    }

    /// Names of all registered computations.
    pub fn computation_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.computations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Fetches the timestamp of a specific block
    async fn get_block_timestamp(
        &self,
        block_number: BlockNumber,
    ) -> Result<UnixTimestamp, SourceError> {
        let block = async { self.provider.get_block_by_number(block_number.into()).await }
            .instrument(spans::get_block(block_number))
            .await
            .map_err(|e| RpcError::get_block_failed(block_number, e))?
            .ok_or(RpcError::BlockNotFound { block_number })?;

        Ok(UnixTimestamp::from_u64(block.header.timestamp))
    }
}

#[async_trait]
impl<P: Provider + 'static> ChainDataSource for ProviderDataSource<P> {
    async fn block_at_or_before(
        &self,
        timestamp: UnixTimestamp,
    ) -> Result<BlockResolution, SourceError> {
        let latest_block = self
            .provider
            .get_block_number()
            .await
            .map_err(RpcError::get_block_number_failed)?;

        find_last_block_at_or_before(timestamp, latest_block, |n| self.get_block_timestamp(n))
            .instrument(spans::find_last_block_at_or_before(timestamp, latest_block))
            .await?
            .ok_or_else(|| {
                SourceError::data_unavailable(format!("no block at or before timestamp {timestamp}"))
            })
    }

    async fn run_at_block(
        &self,
        computation: &Computation,
        block_number: BlockNumber,
    ) -> Result<Value, SourceError> {
        let runner = self
            .computations
            .get(computation.name.as_str())
            .ok_or_else(|| SourceError::UnknownComputation {
                name: computation.name.clone(),
            })?;
        runner
            .run(&self.provider, block_number, &computation.params)
            .await
    }

    fn name(&self) -> &'static str {
        "ProviderDataSource"
    }
}
