// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Stored cache entries

use alloy_primitives::{hex, keccak256};
use serde::{Deserialize, Serialize};

use crate::types::{Method, PartitionId, TimestampMillis};

/// One cached result plus what it was computed from
///
/// `method`, `partition_id` and `input_snapshot` are compared against the
/// requesting work item before the payload is trusted, so a key hash collision
/// or an under-specified cache key degrades into a miss instead of a wrong hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// JSON text of the shaped result
    pub payload: String,
    pub method: Method,
    pub partition_id: PartitionId,
    /// Canonical JSON of the operation's literal inputs
    pub input_snapshot: String,
    /// Caller-facing identifier, kept for diagnostics only
    #[serde(default)]
    pub target: String,
    pub created_at: TimestampMillis,
}

impl CacheEntry {
    /// Returns `true` if this entry was computed for exactly this request.
    pub fn matches(&self, partition_id: &PartitionId, method: Method, input_snapshot: &str) -> bool {
        self.method == method
            && &self.partition_id == partition_id
            && self.input_snapshot == input_snapshot
    }

    /// Keccak-256 over the length-prefixed fields that determine a hit.
    pub(crate) fn checksum(&self) -> String {
        let mut buf = Vec::with_capacity(
            self.payload.len() + self.input_snapshot.len() + self.partition_id.as_str().len() + 64,
        );
        for field in [
            self.method.as_str(),
            self.partition_id.as_str(),
            self.input_snapshot.as_str(),
            self.payload.as_str(),
        ] {
            buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
            buf.extend_from_slice(field.as_bytes());
        }
        hex::encode(keccak256(&buf))
    }
}

/// On-disk wrapper that pairs an entry with its checksum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub(crate) entry: CacheEntry,
    pub(crate) checksum: String,
}

impl StoredEntry {
    pub(crate) fn seal(entry: CacheEntry) -> Self {
        let checksum = entry.checksum();
        Self { entry, checksum }
    }

    pub(crate) fn is_intact(&self) -> bool {
        self.entry.checksum() == self.checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &str) -> CacheEntry {
        CacheEntry {
            payload: payload.to_string(),
            method: Method::TimeToBlock,
            partition_id: PartitionId::new("mainnet").unwrap(),
            input_snapshot: r#"{"method":"time-to-block","timestamp":1}"#.to_string(),
            target: "t".to_string(),
            created_at: TimestampMillis::from_millis(1),
        }
    }

    #[test]
    fn test_seal_and_verify() {
        let stored = StoredEntry::seal(entry("100"));
        assert!(stored.is_intact());

        let mut tampered = stored.clone();
        tampered.entry.payload = "101".to_string();
        assert!(!tampered.is_intact());
    }

    #[test]
    fn test_checksum_ignores_diagnostics() {
        let a = entry("100");
        let mut b = a.clone();
        b.target = "other".to_string();
        b.created_at = TimestampMillis::from_millis(99);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_matches() {
        let e = entry("100");
        let mainnet = PartitionId::new("mainnet").unwrap();
        let base = PartitionId::new("base").unwrap();
        assert!(e.matches(&mainnet, Method::TimeToBlock, &e.input_snapshot));
        assert!(!e.matches(&base, Method::TimeToBlock, &e.input_snapshot));
        assert!(!e.matches(&mainnet, Method::RunAtBlock, &e.input_snapshot));
        assert!(!e.matches(&mainnet, Method::TimeToBlock, "{}"));
    }
}
