// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Strong types for cache addressing and metadata
//!
//! - [`PartitionId`]: scoping unit of a cache store (usually one chain)
//! - [`KeyHash`]: keccak-256 digest of a request's canonical cache key
//! - [`TimestampMillis`]: wall-clock milliseconds for diagnostics and entry age

use alloy_chains::NamedChain;
use alloy_primitives::{hex, keccak256, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::CacheStoreError;

/// Checks that `value` can be used verbatim as a single path component.
pub(crate) fn validate_path_component(value: &str) -> Result<(), CacheStoreError> {
    if value.is_empty() {
        return Err(CacheStoreError::invalid_name(value, "must not be empty"));
    }
    if value == "." || value == ".." {
        return Err(CacheStoreError::invalid_name(value, "must not be a relative path"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(CacheStoreError::invalid_name(
            value,
            format!("character {c:?} is not allowed (use [A-Za-z0-9._-])"),
        ));
    }
    Ok(())
}

/// Scoping unit for a cache store
///
/// Every stored entry records the partition it was computed for, and a hit is
/// only honored when the partition matches the requesting worker's.
///
/// # Examples
///
/// ```rust
/// use alloy_chains::NamedChain;
/// use blockmemo::PartitionId;
///
/// let id = PartitionId::from(NamedChain::Arbitrum);
/// assert_eq!(id.as_str(), "arbitrum");
///
/// assert!(PartitionId::new("base-sepolia").is_ok());
/// assert!(PartitionId::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    /// Creates a partition id, rejecting values that are not path safe.
    pub fn new(id: impl Into<String>) -> Result<Self, CacheStoreError> {
        let id = id.into();
        validate_path_component(&id)?;
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NamedChain> for PartitionId {
    fn from(chain: NamedChain) -> Self {
        Self(chain.to_string())
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keccak-256 digest of a canonical cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHash(B256);

impl KeyHash {
    /// Hashes a canonical cache key.
    pub fn of(cache_key: &str) -> Self {
        Self(keccak256(cache_key.as_bytes()))
    }

    /// Returns the raw digest.
    pub fn as_b256(&self) -> B256 {
        self.0
    }

    /// Lowercase hex without prefix, as used in store files.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Unix timestamp in milliseconds for high-precision cache diagnostics
///
/// Uses milliseconds instead of seconds so that flushes and entries created in
/// rapid succession still order deterministically.
///
/// # Examples
///
/// ```
/// use blockmemo::TimestampMillis;
/// use std::time::Duration;
///
/// let ts = TimestampMillis::now();
/// std::thread::sleep(Duration::from_millis(10));
/// let age = ts.age_since_now();
/// assert!(age >= Duration::from_millis(10));
/// assert!(age < Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampMillis(u128);

impl TimestampMillis {
    /// Creates a new timestamp representing the current time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(millis)
    }

    #[cfg(test)]
    pub(crate) fn from_millis(millis: u128) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    pub fn as_millis(&self) -> u128 {
        self.0
    }

    /// Calculates the age of this timestamp relative to now
    ///
    /// If this timestamp is in the future, returns zero duration.
    pub fn age_since_now(&self) -> Duration {
        let now_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let age_millis = now_millis.saturating_sub(self.0);
        Duration::from_millis(age_millis as u64)
    }
}

impl Default for TimestampMillis {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_id_validation() {
        assert!(PartitionId::new("mainnet").is_ok());
        assert!(PartitionId::new("chain_1.v2-test").is_ok());
        assert!(PartitionId::new("").is_err());
        assert!(PartitionId::new("..").is_err());
        assert!(PartitionId::new("a/b").is_err());
        assert!(PartitionId::new("with space").is_err());
    }

    #[test]
    fn test_partition_id_from_chain() {
        let id = PartitionId::from(NamedChain::Mainnet);
        assert_eq!(id.as_str(), "mainnet");
        assert!(validate_path_component(id.as_str()).is_ok());
    }

    #[test]
    fn test_key_hash_is_deterministic() {
        let a = KeyHash::of("[\"time-to-block\",1700000000]");
        let b = KeyHash::of("[\"time-to-block\",1700000000]");
        let c = KeyHash::of("[\"time-to-block\",1700000001]");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_hex().len(), 64);
        assert!(!a.to_hex().starts_with("0x"));
    }

    #[test]
    fn timestamp_millis_ordering() {
        let t1 = TimestampMillis::from_millis(1000);
        let t2 = TimestampMillis::from_millis(2000);
        assert!(t1 < t2);
        assert_eq!(t1, t1);
    }

    #[test]
    fn timestamp_millis_age_future() {
        let future = TimestampMillis::from_millis(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis()
                + 5000,
        );

        // Future timestamps saturate to zero age
        assert_eq!(future.age_since_now(), Duration::ZERO);
    }

    #[test]
    fn timestamp_millis_serialization() {
        let ts = TimestampMillis::from_millis(1234567890);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1234567890");

        let deserialized: TimestampMillis = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, ts);
    }
}
