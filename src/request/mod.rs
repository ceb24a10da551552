// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Work requests
//!
//! A [`WorkRequest`] describes one cacheable unit of work: the keywords its
//! cache key is built from, the [`Operation`] to dispatch on a miss, and two
//! caller-supplied strategies:
//!
//! - a **shaper** turning the dispatch's raw result `R` into the final,
//!   cached result `F`
//! - an **error handler** deciding, per dispatch failure, whether to
//!   [`Recovery::Raise`], [`Recovery::Skip`] or [`Recovery::Continue`]
//!
//! # Example
//!
//! ```rust,ignore
//! use blockmemo::{Operation, UnixTimestamp, WorkRequest, BlockResolution};
//!
//! let ts = UnixTimestamp(1_700_000_000);
//! let request: WorkRequest<BlockResolution, BlockResolution> = WorkRequest::identity(
//!     vec![ts.into()],
//!     "block@1700000000",
//!     Operation::TimeToBlock { timestamp: ts },
//! );
//! let block = worker.cook(&request).await?;
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::errors::{CookError, SourceError};
use crate::types::{
    cache_key, BlockResolution, BlockValue, HistoricalSeries, KeyHash, Keyword, Method, Operation,
    PartitionId, RawOutput,
};

/// Where a shaper or error handler is being called from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookContext {
    pub partition: PartitionId,
    pub method: Method,
    pub target: String,
    /// 1-based attempt number; 0 for results recovered outside the retry loop
    pub attempt: u32,
}

/// A raw dispatch result type a request can narrow [`RawOutput`] into
pub trait RawResult: Sized + Send + 'static {
    /// Name used in [`CookError::UnexpectedOutput`].
    const KIND: &'static str;

    fn from_output(output: RawOutput) -> Option<Self>;
}

impl RawResult for BlockResolution {
    const KIND: &'static str = "block";

    fn from_output(output: RawOutput) -> Option<Self> {
        match output {
            RawOutput::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl RawResult for Value {
    const KIND: &'static str = "value";

    fn from_output(output: RawOutput) -> Option<Self> {
        match output {
            RawOutput::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl RawResult for Vec<BlockValue> {
    const KIND: &'static str = "blocks";

    fn from_output(output: RawOutput) -> Option<Self> {
        match output {
            RawOutput::Blocks(values) => Some(values),
            _ => None,
        }
    }
}

impl RawResult for HistoricalSeries {
    const KIND: &'static str = "series";

    fn from_output(output: RawOutput) -> Option<Self> {
        match output {
            RawOutput::Series(series) => Some(series),
            _ => None,
        }
    }
}

/// A final result type that can be stored in a [`CacheStore`](crate::CacheStore)
pub trait CachePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CachePayload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// What to do with a dispatch failure
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery<R, F> {
    /// Propagate the error into the retry loop
    Raise,
    /// Return this final result as-is; nothing is shaped or cached
    Skip(F),
    /// Treat this raw result as if the dispatch had produced it
    Continue(R),
}

/// Converts a raw result into a final result
pub type Shaper<R, F> = Arc<dyn Fn(&CookContext, R) -> Result<F, CookError> + Send + Sync>;

/// Classifies a dispatch failure
pub type ErrorHandler<R, F> = Arc<dyn Fn(&CookContext, &SourceError) -> Recovery<R, F> + Send + Sync>;

/// One cacheable unit of work
///
/// Keywords always start with the operation's method; [`WorkRequest::new`]
/// prepends it. Everything else that affects the result must be among the
/// keywords the caller passes: [`WorkRequest::verify_keywords`] rejects
/// requests whose keywords leave out an input the operation declares as
/// required.
pub struct WorkRequest<R, F> {
    keywords: Vec<Keyword>,
    target: String,
    operation: Operation,
    shaper: Shaper<R, F>,
    error_handler: ErrorHandler<R, F>,
    item_error_handler: ErrorHandler<Value, Value>,
}

impl<R: RawResult, F: CachePayload> WorkRequest<R, F> {
    pub fn new(
        keywords: Vec<Keyword>,
        target: impl Into<String>,
        operation: Operation,
        shaper: impl Fn(&CookContext, R) -> Result<F, CookError> + Send + Sync + 'static,
    ) -> Self {
        let mut all = Vec::with_capacity(keywords.len() + 1);
        all.push(Keyword::from(operation.method()));
        all.extend(keywords);
        Self {
            keywords: all,
            target: target.into(),
            operation,
            shaper: Arc::new(shaper),
            error_handler: Arc::new(|_, _| Recovery::Raise),
            item_error_handler: Arc::new(|_, _| Recovery::Raise),
        }
    }

    /// Sets the handler consulted when a dispatch fails.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&CookContext, &SourceError) -> Recovery<R, F> + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Sets the handler each per-block item of a `run-at-blocks` batch uses.
    pub fn with_item_error_handler(
        mut self,
        handler: impl Fn(&CookContext, &SourceError) -> Recovery<Value, Value> + Send + Sync + 'static,
    ) -> Self {
        self.item_error_handler = Arc::new(handler);
        self
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn method(&self) -> Method {
        self.operation.method()
    }

    /// Canonical rendering of the keywords.
    pub fn cache_key(&self) -> String {
        cache_key(&self.keywords)
    }

    pub fn key_hash(&self) -> KeyHash {
        KeyHash::of(&self.cache_key())
    }

    pub(crate) fn shape(&self, context: &CookContext, raw: R) -> Result<F, CookError> {
        (self.shaper)(context, raw)
    }

    pub(crate) fn recover(&self, context: &CookContext, error: &SourceError) -> Recovery<R, F> {
        (self.error_handler)(context, error)
    }

    pub(crate) fn item_error_handler(&self) -> &ErrorHandler<Value, Value> {
        &self.item_error_handler
    }

    /// Checks that the keywords cover every output-relevant input.
    ///
    /// Fails with [`CookError::KeyUnderspecified`] naming the first missing
    /// input. For `run-at-blocks`, the last keyword must be a list holding
    /// every requested block.
    pub fn verify_keywords(&self) -> Result<(), CookError> {
        let method = self.method();
        let (head, rest) = self
            .keywords
            .split_first()
            .ok_or_else(|| CookError::key_underspecified(method, "method"))?;
        if *head != Keyword::from(method) {
            return Err(CookError::key_underspecified(method, "method"));
        }

        for (label, required) in self.operation.required_keywords() {
            if !rest.iter().any(|keyword| *keyword == required) {
                return Err(CookError::key_underspecified(method, label));
            }
        }

        if let Operation::RunAtBlocks { block_numbers, .. } = &self.operation {
            let tail = rest.last().and_then(Keyword::as_list).unwrap_or_default();
            for block in block_numbers {
                let block = Keyword::from(*block);
                if !tail.contains(&block) {
                    return Err(CookError::key_underspecified(
                        method,
                        format!("block {block} in the tail keyword"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Keywords of the per-block item a `run-at-blocks` batch fans out to.
    ///
    /// The batch's keywords without the method and the block list, with the
    /// block number appended. [`WorkRequest::new`] adds the item's method.
    pub(crate) fn item_keywords(&self, block_number: u64) -> Vec<Keyword> {
        let end = self.keywords.len().saturating_sub(1).max(1);
        let mut keywords: Vec<Keyword> = self.keywords[1..end].to_vec();
        keywords.push(Keyword::from(block_number));
        keywords
    }
}

impl<T: RawResult + CachePayload> WorkRequest<T, T> {
    /// A request whose raw result is already its final result.
    pub fn identity(keywords: Vec<Keyword>, target: impl Into<String>, operation: Operation) -> Self {
        Self::new(keywords, target, operation, |_, raw| Ok(raw))
    }
}

impl<R, F> Clone for WorkRequest<R, F> {
    fn clone(&self) -> Self {
        Self {
            keywords: self.keywords.clone(),
            target: self.target.clone(),
            operation: self.operation.clone(),
            shaper: Arc::clone(&self.shaper),
            error_handler: Arc::clone(&self.error_handler),
            item_error_handler: Arc::clone(&self.item_error_handler),
        }
    }
}

impl<R, F> fmt::Debug for WorkRequest<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRequest")
            .field("keywords", &self.keywords)
            .field("target", &self.target)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
