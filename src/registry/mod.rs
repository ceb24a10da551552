// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Worker registry
//!
//! A [`WorkerRegistry`] hands out one shared [`CacheWorker`] per
//! `(partition, name, options)` so that every task asking for the same store
//! uses the same open file instead of re-loading it.
//!
//! There is no global instance: create a registry at application start and
//! pass it (usually as `Arc<WorkerRegistry>`) to whatever builds tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! use blockmemo::{EngineConfig, WorkerOptions, WorkerRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(WorkerRegistry::new(EngineConfig::at("/var/cache/blockmemo")));
//! let worker = registry.get(&context, "blocks", WorkerOptions::default())?;
//! let same = registry.get(&context, "blocks", WorkerOptions::default())?;
//! assert!(Arc::ptr_eq(&worker, &same));
//!
//! registry.flush_all().await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, WorkerOptions};
use crate::errors::CacheStoreError;
use crate::source::PartitionContext;
use crate::types::PartitionId;
use crate::worker::CacheWorker;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WorkerKey {
    partition: PartitionId,
    name: String,
    options: WorkerOptions,
}

/// Pool of shared [`CacheWorker`]s
///
/// # Thread Safety
///
/// The registry is safe to share across tasks via `Arc<WorkerRegistry>`.
#[derive(Debug)]
pub struct WorkerRegistry {
    config: EngineConfig,
    workers: RwLock<HashMap<WorkerKey, Arc<CacheWorker>>>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            workers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the worker for this key, opening it on first use.
    ///
    /// Workers are keyed by partition id: two contexts with the same
    /// partition id share a worker, and the first context's source serves it.
    pub fn get(
        &self,
        context: &PartitionContext,
        name: &str,
        options: WorkerOptions,
    ) -> Result<Arc<CacheWorker>, CacheStoreError> {
        let key = WorkerKey {
            partition: context.partition().clone(),
            name: name.to_string(),
            options,
        };

        if let Some(worker) = self
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(worker));
        }

        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have opened it between the read and write locks
        if let Some(worker) = workers.get(&key) {
            return Ok(Arc::clone(worker));
        }

        let worker = Arc::new(CacheWorker::open(
            context.clone(),
            name,
            &self.config,
            options,
        )?);
        info!(partition = %key.partition, name = name, options = ?options, "Registered cache worker");
        workers.insert(key, Arc::clone(&worker));
        Ok(worker)
    }

    /// Returns the worker using the registry's default options.
    pub fn get_default(
        &self,
        context: &PartitionContext,
        name: &str,
    ) -> Result<Arc<CacheWorker>, CacheStoreError> {
        self.get(context, name, self.config.options)
    }

    /// Flushes every registered worker.
    ///
    /// Failures are logged and the remaining workers are still flushed; the
    /// first error is returned.
    pub async fn flush_all(&self) -> Result<(), CacheStoreError> {
        let workers: Vec<Arc<CacheWorker>> = self
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut first_error = None;
        for worker in workers {
            if let Err(e) = worker.flush().await {
                warn!(partition = %worker.partition(), name = worker.name(), error = %e, "Failed to flush worker");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for WorkerRegistry {
    fn drop(&mut self) {
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.values() {
            // Workers still shared elsewhere flush when their last handle drops
            match worker.try_flush() {
                Ok(true) => {}
                Ok(false) => debug!(name = worker.name(), "Worker busy at registry drop"),
                Err(e) => warn!(partition = %worker.partition(), name = worker.name(), error = %e, "Failed to flush worker on registry drop"),
            }
        }
    }
}
