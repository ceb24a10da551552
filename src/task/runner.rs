// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

use crate::config::{EngineConfig, WorkerOptions};
use crate::errors::TaskError;
use crate::registry::WorkerRegistry;
use crate::request::{CachePayload, RawResult, WorkRequest};
use crate::source::PartitionContext;
use crate::tracing::spans;
use crate::types::PartitionId;
use crate::worker::CacheWorker;

/// One unit of higher-level work
///
/// Implementors build [`WorkRequest`]s, cook them through the
/// [`TaskContext`], and may run child tasks that share the same worker.
#[async_trait]
pub trait TaskDefinition: Send + Sync {
    type Output: Clone + Send + Sync + 'static;

    /// Task name; also the store name when the task acquires its own worker.
    const NAME: &'static str;

    async fn define(&self, ctx: &TaskContext) -> Result<Self::Output, TaskError>;
}

/// How a [`Task`] gets its [`CacheWorker`]
#[derive(Clone)]
pub enum WorkerAcquisition {
    /// Borrow the registry's worker for `(partition, task name, options)`
    Shared {
        registry: Arc<WorkerRegistry>,
        context: PartitionContext,
        options: WorkerOptions,
    },
    /// Open a private worker, flushed and closed when the task finishes
    Owned {
        context: PartitionContext,
        config: EngineConfig,
    },
    /// Use a worker handed down by a parent task
    Inherited(Arc<CacheWorker>),
}

impl WorkerAcquisition {
    /// Borrow from `registry` with its default options.
    pub fn shared(registry: Arc<WorkerRegistry>, context: PartitionContext) -> Self {
        let options = registry.config().options;
        WorkerAcquisition::Shared {
            registry,
            context,
            options,
        }
    }

    /// Picks [`Owned`](Self::Owned) or [`Inherited`](Self::Inherited) from
    /// whichever of `context` and `worker` is given.
    ///
    /// Supplying both or neither is a [`TaskError::Construction`] error.
    pub fn from_parts(
        context: Option<PartitionContext>,
        worker: Option<Arc<CacheWorker>>,
        config: EngineConfig,
    ) -> Result<Self, TaskError> {
        match (context, worker) {
            (Some(context), None) => Ok(WorkerAcquisition::Owned { context, config }),
            (None, Some(worker)) => Ok(WorkerAcquisition::Inherited(worker)),
            (Some(_), Some(_)) => Err(TaskError::construction(
                "both a partition context and a worker were supplied",
            )),
            (None, None) => Err(TaskError::construction(
                "neither a partition context nor a worker was supplied",
            )),
        }
    }

    fn partition(&self) -> &PartitionId {
        match self {
            WorkerAcquisition::Shared { context, .. } | WorkerAcquisition::Owned { context, .. } => {
                context.partition()
            }
            WorkerAcquisition::Inherited(worker) => worker.partition(),
        }
    }

    fn acquire(&self, name: &str) -> Result<Arc<CacheWorker>, TaskError> {
        Ok(match self {
            WorkerAcquisition::Shared {
                registry,
                context,
                options,
            } => registry.get(context, name, *options)?,
            WorkerAcquisition::Owned { context, config } => Arc::new(CacheWorker::open(
                context.clone(),
                name,
                config,
                config.options,
            )?),
            WorkerAcquisition::Inherited(worker) => Arc::clone(worker),
        })
    }

    /// Best-effort flush after a failed `define`.
    async fn flush_after_error(&self, worker: &CacheWorker) {
        let flushed = match self {
            WorkerAcquisition::Shared { registry, .. } => registry.flush_all().await,
            WorkerAcquisition::Owned { .. } | WorkerAcquisition::Inherited(_) => {
                worker.flush().await
            }
        };
        if let Err(e) = flushed {
            warn!(partition = %worker.partition(), error = %e, "Flush after task failure failed");
        }
    }
}

impl fmt::Debug for WorkerAcquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerAcquisition::Shared {
                context, options, ..
            } => f
                .debug_struct("Shared")
                .field("context", context)
                .field("options", options)
                .finish_non_exhaustive(),
            WorkerAcquisition::Owned { context, config } => f
                .debug_struct("Owned")
                .field("context", context)
                .field("cache_dir", &config.cache_dir)
                .finish(),
            WorkerAcquisition::Inherited(worker) => f.debug_tuple("Inherited").field(worker).finish(),
        }
    }
}

/// What a [`TaskDefinition`] sees while it runs
#[derive(Debug, Clone)]
pub struct TaskContext {
    worker: Arc<CacheWorker>,
}

impl TaskContext {
    pub fn worker(&self) -> &Arc<CacheWorker> {
        &self.worker
    }

    pub fn partition(&self) -> &PartitionId {
        self.worker.partition()
    }

    /// Cooks a request on the task's worker.
    pub async fn cook<R: RawResult, F: CachePayload>(
        &self,
        request: &WorkRequest<R, F>,
    ) -> Result<F, TaskError> {
        Ok(self.worker.cook(request).await?)
    }

    /// Runs a child task on the same worker.
    pub async fn run<D: TaskDefinition>(&self, definition: D) -> Result<D::Output, TaskError> {
        Task::new(definition, WorkerAcquisition::Inherited(Arc::clone(&self.worker)))
            .execute()
            .await
    }
}

/// Runs a [`TaskDefinition`] once and remembers its result
///
/// # Examples
///
/// ```rust,ignore
/// use blockmemo::{ResolveTimeToBlock, Task, WorkerAcquisition};
///
/// let mut task = Task::new(
///     ResolveTimeToBlock::new(ts),
///     WorkerAcquisition::shared(registry.clone(), context.clone()),
/// );
/// let block = task.execute().await?;
/// // Memoized: define() does not run again
/// let again = task.execute().await?;
/// ```
pub struct Task<T: TaskDefinition> {
    definition: T,
    acquisition: WorkerAcquisition,
    result: Option<T::Output>,
}

impl<T: TaskDefinition> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("task", &T::NAME)
            .field("acquisition", &self.acquisition)
            .field("memoized", &self.result.is_some())
            .finish()
    }
}

impl<T: TaskDefinition> Task<T> {
    pub fn new(definition: T, acquisition: WorkerAcquisition) -> Self {
        Self {
            definition,
            acquisition,
            result: None,
        }
    }

    pub fn definition(&self) -> &T {
        &self.definition
    }

    /// The memoized result, once `execute` has succeeded.
    pub fn result(&self) -> Option<&T::Output> {
        self.result.as_ref()
    }

    /// Runs the task, or returns its memoized result.
    ///
    /// On failure the worker is flushed before the error is returned. The
    /// task drops its worker handle on every path.
    pub async fn execute(&mut self) -> Result<T::Output, TaskError> {
        if let Some(result) = &self.result {
            debug!(task = T::NAME, "Returning memoized task result");
            return Ok(result.clone());
        }

        let span = spans::task_execute(T::NAME, self.acquisition.partition());
        async {
            let worker = self.acquisition.acquire(T::NAME)?;
            let ctx = TaskContext {
                worker: Arc::clone(&worker),
            };

            let outcome = self.definition.define(&ctx).await;
            drop(ctx);

            match outcome {
                Ok(output) => {
                    if matches!(self.acquisition, WorkerAcquisition::Owned { .. }) {
                        worker.flush().await?;
                    }
                    self.result = Some(output.clone());
                    Ok(output)
                }
                Err(e) => {
                    warn!(task = T::NAME, error = %e, "Task failed, flushing cache");
                    self.acquisition.flush_after_error(&worker).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
