// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for CacheWorker: hits, retries, flushing, batching,
//! coalescing and cancellation.

mod helpers;

use blockmemo::{
    BlockResolution, BlockValue, CacheStore, CacheWorker, Computation, CookError, Keyword,
    Operation, Recovery, SourceError, UnixTimestamp, WorkRequest, WorkerOptions,
};
use helpers::{block_timestamp, MockChainSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn open(dir: &TempDir, source: &Arc<MockChainSource>) -> CacheWorker {
    CacheWorker::open(
        helpers::context(Arc::clone(source)),
        "worker-tests",
        &helpers::config(dir),
        WorkerOptions::default(),
    )
    .unwrap()
}

fn time_to_block(ts: UnixTimestamp) -> WorkRequest<BlockResolution, BlockResolution> {
    WorkRequest::identity(
        vec![ts.into()],
        format!("block@{ts}"),
        Operation::TimeToBlock { timestamp: ts },
    )
}

fn block_number_at(block: u64) -> WorkRequest<Value, Value> {
    WorkRequest::identity(
        vec![Keyword::from("block.number"), Keyword::from(block)],
        format!("block.number@{block}"),
        Operation::RunAtBlock {
            block_number: block,
            computation: Computation::new("block.number"),
        },
    )
}

#[tokio::test]
async fn test_time_to_block_scenario() {
    helpers::init_tracing();
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    let t = block_timestamp(1_000);
    let first = worker.cook(&time_to_block(t)).await.unwrap();
    assert_eq!(first.block_number, 1_000);
    assert_eq!(source.time_to_block_calls(), 1);

    let second = worker.cook(&time_to_block(t)).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(source.time_to_block_calls(), 1, "second call must be a hit");

    // One second later resolves to the same block but occupies its own slot
    let later = worker
        .cook(&time_to_block(UnixTimestamp(t.0 + 1)))
        .await
        .unwrap();
    assert_eq!(later.block_number, 1_000);
    assert_eq!(source.time_to_block_calls(), 2);
    assert_ne!(
        time_to_block(t).key_hash(),
        time_to_block(UnixTimestamp(t.0 + 1)).key_hash()
    );
}

#[tokio::test]
async fn test_hits_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let t = block_timestamp(42);
    {
        let worker = open(&dir, &source);
        worker.cook(&time_to_block(t)).await.unwrap();
        worker.flush().await.unwrap();
    }

    let worker = open(&dir, &source);
    let block = worker.cook(&time_to_block(t)).await.unwrap();
    assert_eq!(block.block_number, 42);
    assert_eq!(source.time_to_block_calls(), 1);
    assert_eq!(worker.stats().await.hits, 1);
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new().fail_next(2));
    let worker = open(&dir, &source);

    let block = worker
        .cook(&time_to_block(block_timestamp(7)))
        .await
        .unwrap();
    assert_eq!(block.block_number, 7);
    assert_eq!(source.time_to_block_calls(), 3);
    assert_eq!(worker.stats().await.attempts, 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_three_attempts() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new().fail_next(3));
    let worker = open(&dir, &source);

    let err = worker
        .cook(&time_to_block(block_timestamp(7)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CookError::Source(SourceError::Transient { .. })
    ));
    assert_eq!(source.time_to_block_calls(), 3);
    assert_eq!(worker.stats().await.writes, 0);
}

#[tokio::test]
async fn test_snapshot_mismatch_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    // Both requests render the same keywords, so they share a key hash, but
    // their literal inputs differ.
    let narrow: WorkRequest<Value, Value> = WorkRequest::identity(
        vec![Keyword::from("block.number"), Keyword::from(1u64), Keyword::from(5u64)],
        "narrow",
        Operation::RunAtBlock {
            block_number: 5,
            computation: Computation::new("block.number").with_param("x", 1),
        },
    );
    let wide: WorkRequest<Value, Value> = WorkRequest::identity(
        vec![Keyword::from("block.number"), Keyword::from(1u64), Keyword::from(5u64)],
        "wide",
        Operation::RunAtBlock {
            block_number: 5,
            computation: Computation::new("block.number")
                .with_param("x", 1)
                .with_param("y", 1),
        },
    );
    assert_eq!(narrow.key_hash(), wide.key_hash());

    worker.cook(&narrow).await.unwrap();
    worker.cook(&wide).await.unwrap();
    assert_eq!(source.run_at_block_calls(), 2, "mismatched snapshot must recompute");

    // The slot now holds the wide entry; narrow misses again
    worker.cook(&narrow).await.unwrap();
    assert_eq!(source.run_at_block_calls(), 3);
}

#[tokio::test]
async fn test_flush_after_dirty_threshold() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    for block in 0..999u64 {
        worker
            .cook(&time_to_block(block_timestamp(block)))
            .await
            .unwrap();
    }
    assert_eq!(worker.write_count().await, 0);
    assert_eq!(worker.dirty().await, 999);

    worker
        .cook(&time_to_block(block_timestamp(999)))
        .await
        .unwrap();
    assert_eq!(worker.write_count().await, 1);
    assert_eq!(worker.dirty().await, 0);

    let store = CacheStore::open(dir.path(), &helpers::partition(), "worker-tests").unwrap();
    assert_eq!(store.len(), 1000);
}

#[tokio::test(start_paused = true)]
async fn test_flush_after_interval() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    worker
        .cook(&time_to_block(block_timestamp(1)))
        .await
        .unwrap();
    assert_eq!(worker.write_count().await, 0);

    tokio::time::advance(Duration::from_secs(101)).await;
    worker
        .cook(&time_to_block(block_timestamp(2)))
        .await
        .unwrap();
    assert_eq!(worker.write_count().await, 1);
    assert_eq!(worker.dirty().await, 0);
}

#[tokio::test]
async fn test_batch_dispatches_only_uncached_blocks() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    worker.cook(&block_number_at(100)).await.unwrap();
    worker.cook(&block_number_at(300)).await.unwrap();
    assert_eq!(source.run_at_block_calls(), 2);

    let batch: WorkRequest<Vec<BlockValue>, Vec<BlockValue>> = WorkRequest::identity(
        vec![
            Keyword::from("block.number"),
            Keyword::from(vec![100u64, 200, 300]),
        ],
        "block.number@batch",
        Operation::RunAtBlocks {
            block_numbers: vec![100, 200, 300],
            computation: Computation::new("block.number"),
        },
    );
    let values = worker.cook(&batch).await.unwrap();

    assert_eq!(source.run_at_block_calls(), 3, "exactly one new dispatch");
    assert_eq!(source.run_at_block_calls_for(200), 1);
    assert_eq!(
        values,
        vec![
            BlockValue { block_number: 100, value: Value::from(100) },
            BlockValue { block_number: 200, value: Value::from(200) },
            BlockValue { block_number: 300, value: Value::from(300) },
        ]
    );

    // The batch itself is now cached
    worker.cook(&batch).await.unwrap();
    assert_eq!(source.run_at_block_calls(), 3);
}

#[tokio::test]
async fn test_batch_missing_block_keyword_is_rejected() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    let batch: WorkRequest<Vec<BlockValue>, Vec<BlockValue>> = WorkRequest::identity(
        vec![Keyword::from("block.number"), Keyword::from(vec![100u64, 300])],
        "block.number@batch",
        Operation::RunAtBlocks {
            block_numbers: vec![100, 200, 300],
            computation: Computation::new("block.number"),
        },
    );
    let err = worker.cook(&batch).await.unwrap_err();
    assert!(matches!(err, CookError::KeyUnderspecified { .. }));
    assert_eq!(source.total_calls(), 0);
}

fn block_number_batch(blocks: &[u64]) -> WorkRequest<Vec<BlockValue>, Vec<BlockValue>> {
    WorkRequest::identity(
        vec![Keyword::from("block.number"), Keyword::from(blocks.to_vec())],
        "block.number@batch",
        Operation::RunAtBlocks {
            block_numbers: blocks.to_vec(),
            computation: Computation::new("block.number"),
        },
    )
}

#[tokio::test]
async fn test_batch_with_skipped_item_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new().fail_next(1));
    let worker = open(&dir, &source);
    let batch = block_number_batch(&[100, 200])
        .with_item_error_handler(|_, _| Recovery::Skip(Value::from("n/a")));

    let first = worker.cook(&batch).await.unwrap();
    assert_eq!(first[0].value, Value::from("n/a"));
    assert_eq!(first[1].value, Value::from(200));
    assert_eq!(worker.stats().await.writes, 1, "only block 200 is written");

    // The source has recovered: block 100 is dispatched again, 200 is a hit
    let second = worker.cook(&batch).await.unwrap();
    assert_eq!(second[0].value, Value::from(100));
    assert_eq!(second[1].value, Value::from(200));
    assert_eq!(source.run_at_block_calls_for(100), 2);
    assert_eq!(source.run_at_block_calls_for(200), 1);

    // A complete batch is cached as a whole
    let calls = source.total_calls();
    assert_eq!(worker.cook(&batch).await.unwrap(), second);
    assert_eq!(source.total_calls(), calls);
}

#[tokio::test]
async fn test_empty_batch_is_an_empty_result() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    let values = worker.cook(&block_number_batch(&[])).await.unwrap();
    assert!(values.is_empty());
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_cooks_coalesce() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new().with_delay(Duration::from_millis(50)));
    let worker = Arc::new(open(&dir, &source));
    let request = time_to_block(block_timestamp(9));

    let results = futures::future::join_all((0..5).map(|_| {
        let worker = Arc::clone(&worker);
        let request = request.clone();
        async move { worker.cook(&request).await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().block_number, 9);
    }
    assert_eq!(source.time_to_block_calls(), 1);
    let stats = worker.stats().await;
    assert_eq!((stats.misses, stats.hits), (1, 4));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_in_flight_attempt() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new().with_delay(Duration::from_secs(10)));
    let worker = open(&dir, &source);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = worker
        .cook_with_cancel(&time_to_block(block_timestamp(3)), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, CookError::Cancelled { attempts: 1, .. }));
    assert_eq!(source.time_to_block_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_token_never_dispatches() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);

    let token = CancellationToken::new();
    token.cancel();
    let err = worker
        .cook_with_cancel(&time_to_block(block_timestamp(3)), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, CookError::Cancelled { attempts: 0, .. }));
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_does_not_bypass_cache_hits() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(MockChainSource::new());
    let worker = open(&dir, &source);
    let request = time_to_block(block_timestamp(3));
    worker.cook(&request).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(
        worker.cook_with_cancel(&request, &token).await.unwrap().block_number,
        3
    );
}
