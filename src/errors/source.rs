// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the remote data/compute boundary.

use super::RpcError;

/// Errors returned by a [`ChainDataSource`](crate::ChainDataSource).
///
/// The variants split into two groups:
///
/// - **Transient** failures ([`SourceError::Transient`], [`SourceError::Rpc`]) that
///   are worth another attempt.
/// - **Domain** failures ([`SourceError::DataUnavailable`],
///   [`SourceError::ComputeRejected`]) that a request's error handler may turn
///   into a fallback result.
///
/// # Examples
///
/// ```rust
/// use blockmemo::SourceError;
///
/// let error = SourceError::data_unavailable("no pool before block 100");
/// assert!(error.is_domain_failure());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A failure that may succeed on retry (timeouts, dropped connections).
    #[error("Transient compute error: {details}")]
    Transient {
        /// What went wrong
        details: String,
    },

    /// The requested data does not exist at the requested point.
    #[error("Data unavailable: {details}")]
    DataUnavailable {
        /// What was missing
        details: String,
    },

    /// The remote computation ran but rejected its inputs.
    #[error("Computation rejected: {details}")]
    ComputeRejected {
        /// Reason given by the computation
        details: String,
    },

    /// No computation is registered under the requested name.
    #[error("Unknown computation: {name}")]
    UnknownComputation {
        /// The requested computation name
        name: String,
    },

    /// Provider-level RPC failure.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

impl SourceError {
    /// Create a `Transient` error.
    pub fn transient(details: impl Into<String>) -> Self {
        SourceError::Transient {
            details: details.into(),
        }
    }

    /// Create a `DataUnavailable` error.
    pub fn data_unavailable(details: impl Into<String>) -> Self {
        SourceError::DataUnavailable {
            details: details.into(),
        }
    }

    /// Create a `ComputeRejected` error.
    pub fn compute_rejected(details: impl Into<String>) -> Self {
        SourceError::ComputeRejected {
            details: details.into(),
        }
    }

    /// Returns `true` for failures an error handler may recover into a fallback.
    pub fn is_domain_failure(&self) -> bool {
        matches!(
            self,
            SourceError::DataUnavailable { .. } | SourceError::ComputeRejected { .. }
        )
    }
}
