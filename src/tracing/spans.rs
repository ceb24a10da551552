// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Span creation helpers for blockmemo operations.
//!
//! Telemetry is kept out of business logic: instead of `#[instrument]`
//! attributes, each instrumented operation has a span helper here.
//!
//! Usage pattern:
//! ```rust,ignore
//! // sync
//! let span = spans::store_flush(&path);
//! let _guard = span.enter();
//!
//! // async
//! async { /* ... */ }.instrument(spans::cook(&partition, method, &key_hash, target)).await
//! ```

use alloy_primitives::BlockNumber;
use std::path::Path;
use tracing::Span;

use crate::types::{KeyHash, Method, PartitionId, UnixTimestamp};

/// Create span for serving one work request.
///
/// Parent: task execution span, or the batch cook span for fanned-out items
/// Children: perform spans (one per attempt)
#[inline]
pub(crate) fn cook(partition: &PartitionId, method: Method, key_hash: &KeyHash, target: &str) -> Span {
    tracing::debug_span!(
        "blockmemo.cook",
        partition = %partition,
        method = %method,
        key_hash = %key_hash,
        target_key = target,
    )
}

/// Create span for a single dispatch attempt.
///
/// Parent: cook span
/// Children: data source calls, nested cook spans for batches
#[inline]
pub(crate) fn perform(method: Method, attempt: u32) -> Span {
    tracing::debug_span!("blockmemo.perform", method = %method, attempt = attempt)
}

/// Create span for flushing a store to disk.
#[inline]
pub(crate) fn store_flush(path: &Path) -> Span {
    tracing::debug_span!("blockmemo.store_flush", path = %path.display())
}

/// Create span for executing a task.
///
/// Parent: the parent task's span, if any
/// Children: cook spans, child task spans
#[inline]
pub(crate) fn task_execute(task: &'static str, partition: &PartitionId) -> Span {
    tracing::info_span!("blockmemo.task", task = task, partition = %partition)
}

/// Create span for resolving a timestamp to a block via binary search.
///
/// Children: block timestamp fetches
#[inline]
pub(crate) fn find_last_block_at_or_before(target_ts: UnixTimestamp, latest_block: BlockNumber) -> Span {
    tracing::debug_span!(
        "blockmemo.find_last_block_at_or_before",
        target_ts = %target_ts,
        latest_block = latest_block,
    )
}

/// Create span for fetching a block's header.
#[inline]
pub(crate) fn get_block(block_number: BlockNumber) -> Span {
    tracing::trace_span!("blockmemo.get_block", block_number = block_number)
}
