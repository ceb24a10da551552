// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Cache workers
//!
//! A [`CacheWorker`] owns one [`CacheStore`] and serves [`WorkRequest`]s
//! against it:
//!
//! 1. verify the request's keywords cover its operation's inputs
//! 2. on a verified hit, return the stored result
//! 3. otherwise dispatch to the partition's [`ChainDataSource`] with bounded
//!    retries, route failures through the request's error handler, shape the
//!    raw result, write it back and flush if a threshold was crossed
//!
//! Concurrent cooks of the same slot coalesce: one dispatches, the others
//! wait and then read its result from the store.
//!
//! [`ChainDataSource`]: crate::ChainDataSource

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::{EngineConfig, FlushPolicy, RetryPolicy, WorkerOptions};
use crate::errors::{CacheStoreError, CookError};
use crate::request::{CachePayload, CookContext, RawResult, Recovery, WorkRequest};
use crate::source::PartitionContext;
use crate::store::{CacheEntry, CacheStore};
use crate::tracing::spans;
use crate::types::{BlockValue, KeyHash, Method, Operation, PartitionId, RawOutput, TimestampMillis};

mod stats;

pub use stats::WorkerStats;

/// How one attempt ended
enum Status<R, F> {
    /// The dispatch produced a raw result; not cacheable if any batch item
    /// was skipped
    Produced { raw: R, cacheable: bool },
    /// The error handler supplied a final result to return uncached
    Skipped(F),
    /// The error handler supplied a raw result to shape and cache
    Continued(R),
}

struct WorkerState {
    store: CacheStore,
    dirty: usize,
    last_flush: Instant,
    stats: WorkerStats,
}

impl WorkerState {
    fn needs_flush(&self) -> bool {
        self.dirty > 0 || self.store.is_dirty()
    }
}

/// A cooked value and whether an enclosing batch may cache it
struct Cooked<F> {
    value: F,
    cacheable: bool,
}

/// Raw dispatch output; not cacheable if any batch item was skipped
struct Dispatched {
    output: RawOutput,
    cacheable: bool,
}

type Slot = (Method, KeyHash);
type Gates = StdMutex<HashMap<Slot, Arc<Mutex<()>>>>;

/// A handle on one slot's gate
///
/// Removes the gate from the map on drop once no other cook holds it, so a
/// cook future dropped mid-flight does not leak its slot.
struct GateGuard<'a> {
    gates: &'a Gates,
    slot: Slot,
    gate: Arc<Mutex<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        let current = gates
            .get(&self.slot)
            .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate));
        // Only the map and this handle remain: nobody is waiting.
        if current && Arc::strong_count(&self.gate) <= 2 {
            gates.remove(&self.slot);
        }
    }
}

/// Executes work requests against one cache store
///
/// # Examples
///
/// ```rust,ignore
/// use blockmemo::{CacheWorker, EngineConfig, PartitionContext, WorkerOptions};
///
/// let config = EngineConfig::at("/tmp/cache");
/// let worker = CacheWorker::open(context, "blocks", &config, WorkerOptions::default())?;
/// let block = worker.cook(&request).await?;
/// worker.flush().await?;
/// ```
pub struct CacheWorker {
    context: PartitionContext,
    name: String,
    path: PathBuf,
    options: WorkerOptions,
    retry: RetryPolicy,
    flush_policy: FlushPolicy,
    state: Mutex<WorkerState>,
    gates: Gates,
}

impl CacheWorker {
    /// Opens the store for `(context.partition(), name)` under the config's
    /// cache directory.
    ///
    /// With `reset_cache` set the store is wiped and flushed before this
    /// returns.
    pub fn open(
        context: PartitionContext,
        name: &str,
        config: &EngineConfig,
        options: WorkerOptions,
    ) -> Result<Self, CacheStoreError> {
        let mut store = CacheStore::open(&config.cache_dir, context.partition(), name)?;
        if options.reset_cache {
            store.clear();
            store.flush_blocking()?;
            info!(partition = %context.partition(), name = name, "Reset cache store");
        }

        let entries = store.len();
        let path = store.path().to_path_buf();
        if options.verbose {
            info!(partition = %context.partition(), name = name, entries, path = %path.display(), "Opened cache worker");
        } else {
            debug!(partition = %context.partition(), name = name, entries, path = %path.display(), "Opened cache worker");
        }

        Ok(Self {
            context,
            name: name.to_string(),
            path,
            options,
            retry: config.retry,
            flush_policy: config.flush,
            state: Mutex::new(WorkerState {
                store,
                dirty: 0,
                last_flush: Instant::now(),
                stats: WorkerStats::default(),
            }),
            gates: StdMutex::new(HashMap::new()),
        })
    }

    pub fn partition(&self) -> &PartitionId {
        self.context.partition()
    }

    pub fn context(&self) -> &PartitionContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> WorkerOptions {
        self.options
    }

    /// Path of the store file.
    pub fn store_path(&self) -> &Path {
        &self.path
    }

    pub async fn stats(&self) -> WorkerStats {
        self.state.lock().await.stats
    }

    /// Writes not yet flushed.
    pub async fn dirty(&self) -> usize {
        self.state.lock().await.dirty
    }

    /// Number of flushes the store file has seen, across processes.
    pub async fn write_count(&self) -> u64 {
        self.state.lock().await.store.write_count()
    }

    /// Serves a request from the cache, or dispatches it.
    pub async fn cook<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
    ) -> Result<F, CookError> {
        self.cook_inner(request, None).await.map(|cooked| cooked.value)
    }

    /// Like [`cook`](Self::cook), but gives up with [`CookError::Cancelled`]
    /// as soon as `cancel` fires, including mid-attempt.
    pub async fn cook_with_cancel<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        cancel: &CancellationToken,
    ) -> Result<F, CookError> {
        self.cook_inner(request, Some(cancel))
            .await
            .map(|cooked| cooked.value)
    }

    /// Flushes pending writes to disk.
    pub async fn flush(&self) -> Result<(), CacheStoreError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Flushes with blocking I/O if the worker is idle; returns `false` if it
    /// was busy. For `Drop` paths only.
    pub(crate) fn try_flush(&self) -> Result<bool, CacheStoreError> {
        let Ok(mut state) = self.state.try_lock() else {
            return Ok(false);
        };
        if state.needs_flush() {
            state.store.flush_blocking()?;
            self.record_flush(&mut state);
        }
        Ok(true)
    }

    async fn flush_locked(&self, state: &mut WorkerState) -> Result<(), CacheStoreError> {
        if !state.needs_flush() {
            return Ok(());
        }
        state.store.flush().await?;
        self.record_flush(state);
        Ok(())
    }

    fn record_flush(&self, state: &mut WorkerState) {
        state.dirty = 0;
        state.last_flush = Instant::now();
        state.stats.flushes += 1;

        if self.options.verbose {
            info!(partition = %self.partition(), name = %self.name, stats = %state.stats, "Flushed cache store");
        } else {
            debug!(partition = %self.partition(), name = %self.name, stats = %state.stats, "Flushed cache store");
        }
    }

    // Boxed so batched requests can cook their items recursively.
    fn cook_inner<'a, R: RawResult, F: CachePayload>(
        &'a self,
        request: &'a WorkRequest<R, F>,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, Result<Cooked<F>, CookError>> {
        async move {
            request.verify_keywords()?;

            let method = request.method();
            let key_hash = request.key_hash();
            let snapshot = request
                .operation()
                .snapshot()
                .map_err(|source| CookError::Payload {
                    target: request.target().to_string(),
                    source,
                })?;
            let span = spans::cook(self.partition(), method, &key_hash, request.target());

            async move {
                if self.options.reads_cache() {
                    if let Some(value) = self.lookup::<F>(method, &key_hash, &snapshot).await {
                        return Ok(Cooked {
                            value,
                            cacheable: true,
                        });
                    }
                }
                if !self.options.use_cache {
                    return self.compute(request, &key_hash, &snapshot, cancel).await;
                }

                let guard = self.gate((method, key_hash));
                let _permit = guard.gate.lock().await;
                self.compute(request, &key_hash, &snapshot, cancel).await
            }
            .instrument(span)
            .await
        }
        .boxed()
    }

    /// Dispatches after a final lookup, for callers holding the slot's gate.
    async fn compute<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        key_hash: &KeyHash,
        snapshot: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Cooked<F>, CookError> {
        let method = request.method();
        // Another cook may have filled the slot while we waited.
        if self.options.reads_cache() {
            if let Some(value) = self.lookup::<F>(method, key_hash, snapshot).await {
                return Ok(Cooked {
                    value,
                    cacheable: true,
                });
            }
        }
        self.state.lock().await.stats.misses += 1;

        let (raw, cacheable) = match self.retry_loop(request, cancel).await? {
            Status::Skipped(fallback) => {
                debug!(target_key = request.target(), "Error handler skipped; returning fallback uncached");
                return Ok(Cooked {
                    value: fallback,
                    cacheable: false,
                });
            }
            Status::Produced { raw, cacheable } => (raw, cacheable),
            Status::Continued(raw) => (raw, true),
        };

        let context = self.cook_context(request, 0);
        let value = request.shape(&context, raw)?;
        if !cacheable {
            debug!(target_key = request.target(), "Batch holds skipped items; returning result uncached");
        } else if self.options.use_cache {
            self.write_back(request, key_hash, snapshot, &value).await?;
        }
        Ok(Cooked { value, cacheable })
    }

    async fn retry_loop<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Status<R, F>, CookError> {
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.cancelled(request, attempt));
            }
            attempt += 1;
            self.state.lock().await.stats.attempts += 1;

            let result = match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(self.cancelled(request, attempt)),
                        result = self.attempt(request, attempt, cancel) => result,
                    }
                }
                None => self.attempt(request, attempt, None).await,
            };

            match result {
                Ok(status) => return Ok(status),
                Err(error) if attempt < max_attempts && error.is_retryable() => {
                    warn!(
                        target_key = request.target(),
                        method = %request.method(),
                        attempt,
                        max_attempts,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn attempt<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        attempt: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Status<R, F>, CookError> {
        let method = request.method();
        let output = self
            .perform(request, cancel)
            .instrument(spans::perform(method, attempt))
            .await;

        match output {
            Ok(Dispatched { output, cacheable }) => {
                self.state.lock().await.stats.dispatches += 1;
                if output.is_empty() {
                    return Err(CookError::EmptyResult {
                        target: request.target().to_string(),
                    });
                }
                let kind = output.kind();
                R::from_output(output)
                    .map(|raw| Status::Produced { raw, cacheable })
                    .ok_or_else(|| {
                        debug!(method = %method, got = kind, expected = R::KIND, "Raw output kind mismatch");
                        CookError::UnexpectedOutput {
                            method,
                            expected: R::KIND,
                        }
                    })
            }
            Err(CookError::Source(error)) => {
                let context = self.cook_context(request, attempt);
                match request.recover(&context, &error) {
                    Recovery::Raise => Err(CookError::Source(error)),
                    Recovery::Skip(fallback) => Ok(Status::Skipped(fallback)),
                    Recovery::Continue(raw) => {
                        debug!(target_key = request.target(), error = %error, "Error handler continued with fallback");
                        Ok(Status::Continued(raw))
                    }
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Dispatches a request's operation to the data source.
    fn perform<'a, R: RawResult, F: CachePayload>(
        &'a self,
        request: &'a WorkRequest<R, F>,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, Result<Dispatched, CookError>> {
        async move {
            let source = self.context.source();
            let output = match request.operation() {
                Operation::TimeToBlock { timestamp } => {
                    RawOutput::Block(source.block_at_or_before(*timestamp).await?)
                }
                Operation::RunAtBlock {
                    block_number,
                    computation,
                } => RawOutput::Value(source.run_at_block(computation, *block_number).await?),
                Operation::RunAtBlocks {
                    block_numbers,
                    computation,
                } => {
                    let mut values = Vec::with_capacity(block_numbers.len());
                    let mut cacheable = true;
                    for &block_number in block_numbers {
                        let handler = Arc::clone(request.item_error_handler());
                        let item: WorkRequest<Value, Value> = WorkRequest::identity(
                            request.item_keywords(block_number),
                            format!("{}@{block_number}", request.target()),
                            Operation::RunAtBlock {
                                block_number,
                                computation: computation.clone(),
                            },
                        )
                        .with_error_handler(move |context, error| handler(context, error));
                        let cooked = self.cook_inner(&item, cancel).await?;
                        cacheable &= cooked.cacheable;
                        values.push(BlockValue {
                            block_number,
                            value: cooked.value,
                        });
                    }
                    return Ok(Dispatched {
                        output: RawOutput::Blocks(values),
                        cacheable,
                    });
                }
                Operation::RunHistoricalSeries { query } => {
                    RawOutput::Series(source.run_historical_series(query).await?)
                }
            };
            Ok(Dispatched {
                output,
                cacheable: true,
            })
        }
        .boxed()
    }

    /// Returns the stored result for a slot if it was computed for exactly
    /// this input and still decodes as `F`.
    async fn lookup<F: CachePayload>(
        &self,
        method: Method,
        key_hash: &KeyHash,
        snapshot: &str,
    ) -> Option<F> {
        let mut state = self.state.lock().await;
        let decoded = {
            let entry = state.store.get(self.partition(), method, key_hash)?;
            if !entry.matches(self.partition(), method, snapshot) {
                warn!(
                    method = %method,
                    key_hash = %key_hash,
                    stored_target = %entry.target,
                    "Stored entry does not match request input, treating as miss"
                );
                return None;
            }
            serde_json::from_str::<F>(&entry.payload)
        };

        match decoded {
            Ok(value) => {
                state.stats.hits += 1;
                debug!(method = %method, key_hash = %key_hash, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(
                    method = %method,
                    key_hash = %key_hash,
                    error = %e,
                    "Stored payload does not decode as the requested type, recomputing"
                );
                None
            }
        }
    }

    async fn write_back<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        key_hash: &KeyHash,
        snapshot: &str,
        value: &F,
    ) -> Result<(), CookError> {
        let payload = serde_json::to_string(value).map_err(|source| CookError::Payload {
            target: request.target().to_string(),
            source,
        })?;
        let entry = CacheEntry {
            payload,
            method: request.method(),
            partition_id: self.partition().clone(),
            input_snapshot: snapshot.to_string(),
            target: request.target().to_string(),
            created_at: TimestampMillis::now(),
        };

        let mut state = self.state.lock().await;
        state
            .store
            .put(self.partition(), request.method(), key_hash, entry);
        state.dirty += 1;
        state.stats.writes += 1;

        if self
            .flush_policy
            .should_flush(state.dirty, state.last_flush.elapsed())
        {
            self.flush_locked(&mut state).await?;
        }
        Ok(())
    }

    fn gate(&self, slot: Slot) -> GateGuard<'_> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = Arc::clone(gates.entry(slot).or_default());
        GateGuard {
            gates: &self.gates,
            slot,
            gate,
        }
    }

    #[cfg(test)]
    fn open_gates(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cook_context<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        attempt: u32,
    ) -> CookContext {
        CookContext {
            partition: self.partition().clone(),
            method: request.method(),
            target: request.target().to_string(),
            attempt,
        }
    }

    fn cancelled<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
        attempts: u32,
    ) -> CookError {
        debug!(target_key = request.target(), attempts, "Cook cancelled");
        CookError::Cancelled {
            target: request.target().to_string(),
            attempts,
        }
    }
}

impl std::fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("partition", self.partition())
            .field("name", &self.name)
            .field("options", &self.options)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for CacheWorker {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.needs_flush() {
            return;
        }
        match state.store.flush_blocking() {
            Ok(()) => debug!(partition = %self.context.partition(), name = %self.name, "Flushed cache store on drop"),
            Err(e) => warn!(partition = %self.context.partition(), name = %self.name, error = %e, "Failed to flush cache store on drop"),
        }
    }
}
