// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the blockmemo library.
//!
//! This module follows a hybrid approach:
//!
//! - **Module-specific errors** for fine-grained error handling
//!   ([`CookError`], [`TaskError`], etc.)
//! - **Unified error type** ([`BlockMemoError`]) for convenience when you don't
//!   need to distinguish between error sources
//!
//! # Architecture
//!
//! - [`CacheStoreError`] - Errors from loading and flushing store files
//! - [`SourceError`] - Errors from the remote data/compute boundary
//! - [`RpcError`] - Provider failures inside [`ProviderDataSource`](crate::ProviderDataSource)
//! - [`CookError`] - Errors from serving a single work request
//! - [`TaskError`] - Errors from composed tasks
//!
//! # Examples
//!
//! ```rust,ignore
//! use blockmemo::{CookError, SourceError};
//!
//! match worker.cook(&request).await {
//!     Ok(block) => println!("resolved {block:?}"),
//!     Err(CookError::KeyUnderspecified { method, missing }) => {
//!         panic!("caller bug: {method} is missing {missing}");
//!     }
//!     Err(CookError::Source(SourceError::DataUnavailable { details })) => {
//!         eprintln!("no data: {details}");
//!     }
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! ```

mod cook;
mod rpc;
mod source;
mod store;
mod task;

pub use cook::CookError;
pub use rpc::RpcError;
pub use source::SourceError;
pub use store::CacheStoreError;
pub use task::TaskError;

/// Unified error type for all blockmemo operations.
///
/// All module-specific error types automatically convert to `BlockMemoError` via
/// `From` implementations, so you can use `?` to propagate errors naturally.
#[derive(Debug, thiserror::Error)]
pub enum BlockMemoError {
    /// Error from the cache store.
    #[error("Cache store error: {0}")]
    Store(#[from] CacheStoreError),

    /// Error from the data source.
    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    /// Error from cooking a work request.
    #[error("Cook error: {0}")]
    Cook(#[from] CookError),

    /// Error from a composed task.
    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}
