// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the on-disk cache store.

/// Errors that can occur while loading, validating, or flushing a cache store.
///
/// A corrupt store file is never reported through this type: the store treats
/// it as empty and schedules an overwrite. These errors cover the cases where
/// the store genuinely cannot make progress (unwritable directory, bad names).
#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    /// Error reading from or writing to the store file.
    #[error("Cache I/O error at {path}: {details}")]
    Io {
        /// Path to the file or directory that caused the error
        path: String,
        /// Details about the I/O error
        details: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error serializing or deserializing store data.
    #[error("Serialization error: {details}")]
    Serialization {
        /// Details about the serialization error
        details: String,
        /// The underlying serialization error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A partition id or logical store name is not usable as a path component.
    #[error("Invalid store name '{value}': {reason}")]
    InvalidName {
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl CacheStoreError {
    /// Create an `Io` error with the offending path.
    pub fn io(path: impl Into<String>, details: impl Into<String>, source: std::io::Error) -> Self {
        CacheStoreError::Io {
            path: path.into(),
            details: details.into(),
            source,
        }
    }

    /// Create a `Serialization` error from any serialization error.
    pub fn serialization(
        details: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CacheStoreError::Serialization {
            details: details.into(),
            source: Box::new(source),
        }
    }

    /// Create an `InvalidName` error.
    pub fn invalid_name(value: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheStoreError::InvalidName {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
