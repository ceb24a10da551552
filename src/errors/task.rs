// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the task layer.

use super::{CacheStoreError, CookError};

/// Errors that can occur while constructing or executing a [`Task`](crate::Task).
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task was constructed with an invalid worker acquisition.
    ///
    /// Exactly one of a partition context or an inherited worker must be given.
    #[error("Invalid task construction: {reason}")]
    Construction {
        /// Why construction failed
        reason: String,
    },

    /// A work request failed.
    #[error("Cook error: {0}")]
    Cook(#[from] CookError),

    /// Opening or flushing the task's worker failed.
    #[error("Store error: {0}")]
    Store(#[from] CacheStoreError),

    /// Post-processing of cooked results failed.
    #[error("Derivation failed in {task}: {details}")]
    Derivation {
        /// The task that failed
        task: &'static str,
        /// Why it failed
        details: String,
    },
}

impl TaskError {
    /// Create a `Construction` error.
    pub fn construction(reason: impl Into<String>) -> Self {
        TaskError::Construction {
            reason: reason.into(),
        }
    }

    /// Create a `Derivation` error.
    pub fn derivation(task: &'static str, details: impl Into<String>) -> Self {
        TaskError::Derivation {
            task,
            details: details.into(),
        }
    }
}
