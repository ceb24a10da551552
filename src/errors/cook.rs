// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for cooking work requests.

use super::{CacheStoreError, SourceError};
use crate::types::Method;

/// Errors that can occur while a [`CacheWorker`](crate::CacheWorker) serves a
/// [`WorkRequest`](crate::WorkRequest).
///
/// # Retry policy
///
/// [`CookError::is_retryable`] decides whether the worker's retry loop makes
/// another attempt. Caller bugs (`KeyUnderspecified`), post-dispatch invariant
/// violations (`EmptyResult`) and cancellation are never retried.
#[derive(Debug, thiserror::Error)]
pub enum CookError {
    /// The request's cache keywords do not cover an output-relevant input.
    ///
    /// Raised before any dispatch. Indicates the caller under-specified the
    /// cache key and would otherwise risk a silent wrong answer.
    #[error("Cache key may not be unique for {method}: keyword for {missing} is missing")]
    KeyUnderspecified {
        /// The method being dispatched
        method: Method,
        /// Description of the input that is not represented in the keywords
        missing: String,
    },

    /// The data source failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The dispatched method produced an output the request cannot consume.
    #[error("Unexpected output from {method}: expected {expected}")]
    UnexpectedOutput {
        /// The method that was dispatched
        method: Method,
        /// The raw result type the request expected
        expected: &'static str,
    },

    /// The request's result shaper rejected the raw result.
    #[error("Failed to shape result for {target}: {details}")]
    Shaping {
        /// The request's target key
        target: String,
        /// Why shaping failed
        details: String,
    },

    /// No status produced a usable result.
    #[error("Result is nil/empty for {target}")]
    EmptyResult {
        /// The request's target key
        target: String,
    },

    /// The caller cancelled the request before it completed.
    #[error("Cook cancelled for {target} after {attempts} attempt(s)")]
    Cancelled {
        /// The request's target key
        target: String,
        /// Attempts started before cancellation was observed
        attempts: u32,
    },

    /// Failed to serialize a shaped result for storage.
    #[error("Failed to encode payload for {target}")]
    Payload {
        /// The request's target key
        target: String,
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// The cache store failed to persist.
    #[error("Cache store error: {0}")]
    Store(#[from] CacheStoreError),
}

impl CookError {
    /// Create a `KeyUnderspecified` error.
    pub fn key_underspecified(method: Method, missing: impl Into<String>) -> Self {
        CookError::KeyUnderspecified {
            method,
            missing: missing.into(),
        }
    }

    /// Create a `Shaping` error.
    pub fn shaping(target: impl Into<String>, details: impl Into<String>) -> Self {
        CookError::Shaping {
            target: target.into(),
            details: details.into(),
        }
    }

    /// Returns `true` when another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CookError::KeyUnderspecified { .. }
                | CookError::EmptyResult { .. }
                | CookError::Cancelled { .. }
        )
    }

    /// Returns the underlying source error, if any.
    pub fn source_error(&self) -> Option<&SourceError> {
        match self {
            CookError::Source(e) => Some(e),
            _ => None,
        }
    }
}
