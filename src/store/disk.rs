// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Disk-backed store with versioning, per-entry checksums and atomic flush

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Instrument};

use super::entry::{CacheEntry, StoredEntry};
use crate::config::constants::{FLUSH_HISTORY_LIMIT, STORE_FILE_EXTENSION, STORE_FORMAT_VERSION};
use crate::errors::CacheStoreError;
use crate::tracing::spans;
use crate::types::cache::validate_path_component;
use crate::types::{KeyHash, Method, PartitionId, TimestampMillis};

type Entries = BTreeMap<String, BTreeMap<String, BTreeMap<String, StoredEntry>>>;

/// Serialized store format (versioned)
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// Number of flushes that ever produced this file
    #[serde(default)]
    write_count: u64,
    /// Most recent flush times, oldest first
    #[serde(default)]
    flush_history: Vec<TimestampMillis>,
    /// partition -> method -> key hash -> entry
    #[serde(default)]
    partitions: Entries,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            write_count: 0,
            flush_history: Vec::new(),
            partitions: BTreeMap::new(),
        }
    }
}

/// Same layout as [`StoreFile`] with entries left unparsed, so one damaged
/// entry does not discard its neighbours.
#[derive(Debug, Deserialize)]
struct LenientStoreFile {
    version: u32,
    #[serde(default)]
    write_count: u64,
    #[serde(default)]
    flush_history: Vec<TimestampMillis>,
    #[serde(default)]
    partitions: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
}

/// Outcome of reading a store file
#[derive(Debug)]
struct Loaded {
    data: StoreFile,
    /// The file on disk does not match `data` and should be rewritten
    needs_rewrite: bool,
}

/// Durable key-value store for one `(partition, logical name)` pair
///
/// All reads and writes between flushes are in memory; [`CacheStore::flush`]
/// is the only operation that touches disk after [`CacheStore::open`].
///
/// The file lives at `<root>/<partition>/<name>.json` and contains:
///
/// - a format `version`
/// - a monotonic `write_count` and recent `flush_history` (diagnostics only)
/// - `partitions`: partition id -> method -> key hash -> entry + checksum
///
/// # Corruption handling
///
/// - Missing file: empty store.
/// - Unreadable file, unparseable file, or unknown version: empty store, and
///   the file is overwritten immediately.
/// - Individual entries that fail to parse or whose checksum doesn't match
///   are dropped; the rest of the file is kept and the file is rewritten.
///
/// # Examples
///
/// ```rust,ignore
/// use blockmemo::{CacheStore, PartitionId};
///
/// let partition = PartitionId::new("mainnet")?;
/// let mut store = CacheStore::open("/var/cache/blockmemo", &partition, "blocks")?;
/// println!("{} entries in {}", store.len(), store.path().display());
/// store.flush().await?;
/// ```
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    data: StoreFile,
    dirty: bool,
}

impl CacheStore {
    /// Path of the store file for a partition and logical name.
    pub fn file_path(
        root: impl AsRef<Path>,
        partition: &PartitionId,
        name: &str,
    ) -> Result<PathBuf, CacheStoreError> {
        validate_path_component(name)?;
        Ok(root
            .as_ref()
            .join(partition.as_str())
            .join(format!("{name}.{STORE_FILE_EXTENSION}")))
    }

    /// Opens (and loads) the store for a partition and logical name.
    ///
    /// If the existing file had to be discarded or repaired it is rewritten
    /// (blocking) before this returns.
    pub fn open(
        root: impl AsRef<Path>,
        partition: &PartitionId,
        name: &str,
    ) -> Result<Self, CacheStoreError> {
        let path = Self::file_path(root, partition, name)?;
        let mut store = Self {
            path,
            data: StoreFile::default(),
            dirty: false,
        };
        if store.load() {
            store.flush_blocking()?;
        }
        Ok(store)
    }

    /// Reads the file into memory, replacing the in-memory contents.
    ///
    /// Returns `true` if the file should be rewritten.
    pub fn load(&mut self) -> bool {
        let loaded = Self::read(&self.path);
        self.data = loaded.data;
        self.dirty = loaded.needs_rewrite;
        loaded.needs_rewrite
    }

    fn read(path: &Path) -> Loaded {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file does not exist, using empty store");
                return Loaded {
                    data: StoreFile::default(),
                    needs_rewrite: false,
                };
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read store file, using empty store");
                return Self::discarded();
            }
        };

        let lenient: LenientStoreFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse store file, using empty store");
                return Self::discarded();
            }
        };

        if lenient.version != STORE_FORMAT_VERSION {
            warn!(
                path = %path.display(),
                stored_version = lenient.version,
                current_version = STORE_FORMAT_VERSION,
                "Store version mismatch, ignoring stored data"
            );
            return Self::discarded();
        }

        let mut dropped = 0usize;
        let mut kept = 0usize;
        let mut partitions: Entries = BTreeMap::new();
        for (partition, methods) in lenient.partitions {
            for (method, entries) in methods {
                for (key, raw) in entries {
                    match serde_json::from_value::<StoredEntry>(raw) {
                        Ok(stored) if stored.is_intact() => {
                            partitions
                                .entry(partition.clone())
                                .or_default()
                                .entry(method.clone())
                                .or_default()
                                .insert(key, stored);
                            kept += 1;
                        }
                        Ok(_) => {
                            warn!(partition = %partition, method = %method, key_hash = %key, "Dropping entry with bad checksum");
                            dropped += 1;
                        }
                        Err(e) => {
                            warn!(partition = %partition, method = %method, key_hash = %key, error = %e, "Dropping unparseable entry");
                            dropped += 1;
                        }
                    }
                }
            }
        }

        info!(
            path = %path.display(),
            entries = kept,
            dropped,
            write_count = lenient.write_count,
            "Loaded cache store"
        );

        Loaded {
            data: StoreFile {
                version: STORE_FORMAT_VERSION,
                write_count: lenient.write_count,
                flush_history: lenient.flush_history,
                partitions,
            },
            needs_rewrite: dropped > 0,
        }
    }

    fn discarded() -> Loaded {
        Loaded {
            data: StoreFile::default(),
            needs_rewrite: true,
        }
    }

    /// Looks up an entry.
    pub fn get(&self, partition: &PartitionId, method: Method, key: &KeyHash) -> Option<&CacheEntry> {
        self.data
            .partitions
            .get(partition.as_str())?
            .get(method.as_str())?
            .get(&key.to_hex())
            .map(|stored| &stored.entry)
    }

    /// Inserts or replaces an entry and marks the store dirty.
    pub fn put(&mut self, partition: &PartitionId, method: Method, key: &KeyHash, entry: CacheEntry) {
        self.data
            .partitions
            .entry(partition.as_str().to_string())
            .or_default()
            .entry(method.as_str().to_string())
            .or_default()
            .insert(key.to_hex(), StoredEntry::seal(entry));
        self.dirty = true;
    }

    /// Removes every entry and marks the store dirty.
    pub fn clear(&mut self) {
        self.data.partitions.clear();
        self.dirty = true;
    }

    /// Number of stored entries across all partitions and methods.
    pub fn len(&self) -> usize {
        self.data
            .partitions
            .values()
            .flat_map(|methods| methods.values())
            .map(|entries| entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether in-memory contents differ from disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes that ever produced this store's file.
    pub fn write_count(&self) -> u64 {
        self.data.write_count
    }

    /// Recent flush times, oldest first.
    pub fn flush_history(&self) -> &[TimestampMillis] {
        &self.data.flush_history
    }

    /// Serializes the whole store and atomically replaces the file.
    ///
    /// Writes to a sibling temp file first and renames it over the target, so
    /// readers never observe a half-written store. `write_count` and
    /// `flush_history` only advance once the rename succeeded.
    pub async fn flush(&mut self) -> Result<(), CacheStoreError> {
        let staged = self.stage()?;
        let temp_path = self.temp_path();
        let path = self.path.clone();

        async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| create_dir_error(parent, e))?;
            }
            tokio::fs::write(&temp_path, &staged.json)
                .await
                .map_err(|e| write_error(&temp_path, e))?;
            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(|e| rename_error(&path, &temp_path, e))
        }
        .instrument(spans::store_flush(&self.path))
        .await?;

        self.commit(staged);
        Ok(())
    }

    /// Blocking variant of [`flush`](Self::flush) for constructors and `Drop`,
    /// where no runtime can be awaited.
    pub fn flush_blocking(&mut self) -> Result<(), CacheStoreError> {
        let span = spans::store_flush(&self.path);
        let _guard = span.enter();

        let staged = self.stage()?;
        let temp_path = self.temp_path();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| create_dir_error(parent, e))?;
        }
        std::fs::write(&temp_path, &staged.json).map_err(|e| write_error(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| rename_error(&self.path, &temp_path, e))?;

        self.commit(staged);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension(format!("{STORE_FILE_EXTENSION}.tmp"))
    }

    /// Encodes the file as it will look after this flush.
    fn stage(&self) -> Result<Staged, CacheStoreError> {
        let write_count = self.data.write_count.saturating_add(1);
        let mut flush_history = self.data.flush_history.clone();
        flush_history.push(TimestampMillis::now());
        if flush_history.len() > FLUSH_HISTORY_LIMIT {
            let excess = flush_history.len() - FLUSH_HISTORY_LIMIT;
            flush_history.drain(..excess);
        }

        let json = serde_json::to_vec(&StoreFileView {
            version: STORE_FORMAT_VERSION,
            write_count,
            flush_history: &flush_history,
            partitions: &self.data.partitions,
        })
        .map_err(|e| CacheStoreError::serialization("Failed to encode cache store", e))?;

        Ok(Staged {
            json,
            write_count,
            flush_history,
        })
    }

    fn commit(&mut self, staged: Staged) {
        self.data.write_count = staged.write_count;
        self.data.flush_history = staged.flush_history;
        self.dirty = false;
        debug!(
            path = %self.path.display(),
            entries = self.len(),
            write_count = self.data.write_count,
            bytes = staged.json.len(),
            "Flushed cache store"
        );
    }
}

/// Encoded store contents plus the diagnostics they carry
struct Staged {
    json: Vec<u8>,
    write_count: u64,
    flush_history: Vec<TimestampMillis>,
}

/// Borrowed form of [`StoreFile`] used for encoding
#[derive(Serialize)]
struct StoreFileView<'a> {
    version: u32,
    write_count: u64,
    flush_history: &'a [TimestampMillis],
    partitions: &'a Entries,
}

fn create_dir_error(parent: &Path, e: std::io::Error) -> CacheStoreError {
    CacheStoreError::io(
        parent.display().to_string(),
        "Failed to create cache directory. Ensure you have write permissions.",
        e,
    )
}

fn write_error(temp_path: &Path, e: std::io::Error) -> CacheStoreError {
    CacheStoreError::io(
        temp_path.display().to_string(),
        "Failed to write cache store. Ensure the parent directory is writable.",
        e,
    )
}

fn rename_error(path: &Path, temp_path: &Path, e: std::io::Error) -> CacheStoreError {
    CacheStoreError::io(
        path.display().to_string(),
        format!("Failed to rename '{}' over the store file", temp_path.display()),
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn partition() -> PartitionId {
        PartitionId::new("mainnet").unwrap()
    }

    fn entry(payload: &str, snapshot: &str) -> CacheEntry {
        CacheEntry {
            payload: payload.to_string(),
            method: Method::TimeToBlock,
            partition_id: partition(),
            input_snapshot: snapshot.to_string(),
            target: "test".to_string(),
            created_at: TimestampMillis::now(),
        }
    }

    #[test]
    fn test_store_basic_operations() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        let key = KeyHash::of("a");

        assert!(store.is_empty());
        assert!(store.get(&partition(), Method::TimeToBlock, &key).is_none());

        store.put(&partition(), Method::TimeToBlock, &key, entry("100", "s"));
        assert!(store.is_dirty());
        assert_eq!(store.len(), 1);

        let found = store.get(&partition(), Method::TimeToBlock, &key).unwrap();
        assert_eq!(found.payload, "100");
        assert!(store.get(&partition(), Method::RunAtBlock, &key).is_none());
    }

    #[tokio::test]
    async fn test_store_persistence() {
        let dir = TempDir::new().unwrap();
        let key = KeyHash::of("a");

        {
            let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
            store.put(&partition(), Method::TimeToBlock, &key, entry("100", "s"));
            store.flush().await.unwrap();
            assert!(!store.is_dirty());
        }

        let store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.flush_history().len(), 1);
        assert_eq!(
            store.get(&partition(), Method::TimeToBlock, &key).unwrap().payload,
            "100"
        );
        assert!(store.path().ends_with("mainnet/blocks.json"));
    }

    #[tokio::test]
    async fn test_flush_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        store.put(&partition(), Method::TimeToBlock, &KeyHash::of("a"), entry("1", "s"));
        store.flush().await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("mainnet"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["blocks.json".to_string()]);
    }

    #[tokio::test]
    async fn test_write_count_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        store.flush().await.unwrap();
        store.flush().await.unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.write_count(), 3);

        let reopened = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert_eq!(reopened.write_count(), 3);
        assert_eq!(reopened.flush_history().len(), 3);
    }

    #[test]
    fn test_corrupt_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = CacheStore::file_path(dir.path(), &partition(), "blocks").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        let store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());

        // The rewrite happened during open
        let bytes = std::fs::read(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["version"], STORE_FORMAT_VERSION);
    }

    #[test]
    fn test_version_mismatch_discards_data() {
        let dir = TempDir::new().unwrap();
        let path = CacheStore::file_path(dir.path(), &partition(), "blocks").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, br#"{"version": 999, "partitions": {}}"#).unwrap();

        let store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_tampered_entry_is_dropped_individually() {
        let dir = TempDir::new().unwrap();
        let good = KeyHash::of("good");
        let bad = KeyHash::of("bad");
        {
            let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
            store.put(&partition(), Method::TimeToBlock, &good, entry("1", "s1"));
            store.put(&partition(), Method::TimeToBlock, &bad, entry("2", "s2"));
            store.flush().await.unwrap();
        }

        let path = CacheStore::file_path(dir.path(), &partition(), "blocks").unwrap();
        let mut json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json["partitions"]["mainnet"]["time-to-block"][bad.to_hex()]["entry"]["payload"] =
            serde_json::Value::String("999".to_string());
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&partition(), Method::TimeToBlock, &good).is_some());
        assert!(store.get(&partition(), Method::TimeToBlock, &bad).is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        store.put(&partition(), Method::TimeToBlock, &KeyHash::of("a"), entry("1", "s"));
        store.flush().await.unwrap();

        store.clear();
        assert!(store.is_empty());
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_diagnostics() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        store.put(&partition(), Method::TimeToBlock, &KeyHash::of("a"), entry("1", "s"));

        // A plain file where the partition directory should go
        std::fs::write(dir.path().join("mainnet"), b"").unwrap();

        assert!(store.flush().await.is_err());
        assert!(store.flush_blocking().is_err());
        assert_eq!(store.write_count(), 0);
        assert!(store.flush_history().is_empty());
        assert!(store.is_dirty());

        std::fs::remove_file(dir.path().join("mainnet")).unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.flush_history().len(), 1);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_flush_blocking_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        store.put(&partition(), Method::TimeToBlock, &KeyHash::of("a"), entry("1", "s"));
        store.flush_blocking().unwrap();

        let reopened = CacheStore::open(dir.path(), &partition(), "blocks").unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.write_count(), 1);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(CacheStore::open(dir.path(), &partition(), "../escape").is_err());
        assert!(CacheStore::open(dir.path(), &partition(), "").is_err());
    }
}
