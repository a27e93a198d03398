//! Disk-backed object cache with time-based expiry
//!
//! Each entry is one pretty-printed JSON file at `<root>/<namespace><sanitized key>`.
//! Its last-write time lives in a separate [`ExpiryStore`] under the same entry
//! name. Staleness is computed at read time: stale files stay on disk until they
//! are overwritten, invalidated or cleared.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::Builder;
use thiserror::Error;

use super::config::{CacheConfig, DEFAULT_NAMESPACE};
use super::expiry::{ExpiryStore, JsonExpiryStore, MemoryExpiryStore};
use super::sanitize::sanitize_key;

/// Prefix of in-progress temp files inside the cache root
const PARTIAL_PREFIX: &str = ".partial-";

/// Temp files untouched for this long are leftovers of an interrupted write
const ABANDONED_PARTIAL_AGE: Duration = Duration::from_secs(3600);

fn remove_abandoned_partial(entry: &fs::DirEntry) {
    let abandoned = entry
        .metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > ABANDONED_PARTIAL_AGE);
    if abandoned {
        if let Err(e) = fs::remove_file(entry.path()) {
            tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove abandoned temp file");
        }
    }
}

/// Errors surfaced when reading a cache entry
#[derive(Debug, Error)]
pub enum CacheError {
    /// A stored payload exists but does not deserialize into the requested type
    #[error("Failed to decode cached payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// A payload could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Filesystem access failed for a reason other than a missing file
    #[error("Cache I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Result of a cache write
///
/// Writes are best-effort: failures are reported here and logged, never raised.
/// Callers are free to ignore the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload and its timestamp were stored
    Stored,
    /// Nothing was stored, with the reason
    Skipped(String),
}

impl WriteOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, WriteOutcome::Stored)
    }
}

/// Contract shared by [`ObjectCache`] and [`NullCache`](super::NullCache)
pub trait ResponseCache: Send + Sync {
    /// Returns the payload stored under `key`
    ///
    /// `Ok(None)` when the key is absent or stale. A stored payload that cannot
    /// be decoded into `T` is an error, never a miss.
    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError>;

    /// Stores `payload` under `key` and refreshes its timestamp
    fn write<T: Serialize>(&self, payload: &T, key: &str) -> WriteOutcome;

    /// Removes the entry for `key`; idempotent
    fn invalidate(&self, key: &str);

    /// Removes every entry owned by this cache's namespace
    fn clear_all(&self);

    /// Releases durable resources held by the cache
    fn close(&self) {}
}

/// Persists serializable payloads as JSON files with a fixed TTL
#[derive(Clone)]
pub struct ObjectCache {
    root: PathBuf,
    ttl: chrono::Duration,
    namespace: String,
    expiry: Arc<dyn ExpiryStore>,
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("root", &self.root)
            .field("ttl", &self.ttl)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ObjectCache {
    /// Creates a cache over `config.root` using the given expiry store
    ///
    /// When `config.clear_on_init` is set, the namespace is cleared before this
    /// returns.
    pub fn new(config: CacheConfig, expiry: Arc<dyn ExpiryStore>) -> Self {
        let ttl = chrono::Duration::from_std(config.ttl).unwrap_or(chrono::Duration::MAX);
        let cache = Self {
            root: config.root,
            ttl,
            namespace: config.namespace,
            expiry,
        };

        if config.clear_on_init {
            cache.clear_all();
        }
        cache
    }

    /// Creates a cache whose timestamps persist in `config.expiry_file`
    pub fn open(config: CacheConfig) -> io::Result<Self> {
        let expiry = JsonExpiryStore::open(&config.expiry_file)?;
        Ok(Self::new(config, Arc::new(expiry)))
    }

    /// Creates a cache in `root` with the default namespace and in-memory timestamps
    ///
    /// Useful for testing or short-lived sessions. Nothing is written outside `root`.
    pub fn with_dir(root: PathBuf, ttl: Duration) -> Self {
        let config = CacheConfig {
            // Only read by `open`; the in-memory store has no file.
            expiry_file: PathBuf::new(),
            root,
            ttl,
            namespace: DEFAULT_NAMESPACE.to_string(),
            clear_on_init: false,
        };
        Self::new(config, Arc::new(MemoryExpiryStore::new()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entry name for `key`: the namespace prefix followed by the sanitized key
    pub fn entry_name(&self, key: &str) -> String {
        format!("{}{}", self.namespace, sanitize_key(key))
    }

    /// Path of the payload file for `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(self.entry_name(key))
    }

    /// Serializes `payload` and atomically replaces the entry file
    fn persist<T: Serialize>(&self, entry_name: &str, payload: &T) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(payload).map_err(CacheError::Encode)?;
        fs::create_dir_all(&self.root)?;

        let mut tmp = Builder::new().prefix(PARTIAL_PREFIX).tempfile_in(&self.root)?;
        tmp.write_all(&json)?;
        tmp.persist(self.root.join(entry_name))
            .map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

impl ResponseCache for ObjectCache {
    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let entry_name = self.entry_name(key);

        // Timestamp first: a stale entry never touches the payload file.
        let Some(written_at) = self.expiry.last_write(&entry_name) else {
            tracing::debug!(key, "Cache miss");
            return Ok(None);
        };
        if Utc::now() - written_at > self.ttl {
            tracing::debug!(key, %written_at, "Cache entry is stale");
            return Ok(None);
        }

        let content = match fs::read(self.root.join(&entry_name)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(key, "Cache timestamp without payload");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        let data = serde_json::from_slice(&content).map_err(CacheError::Decode)?;
        tracing::debug!(key, "Cache hit");
        Ok(Some(data))
    }

    fn write<T: Serialize>(&self, payload: &T, key: &str) -> WriteOutcome {
        let entry_name = self.entry_name(key);
        match self.persist(&entry_name, payload) {
            Ok(()) => {
                self.expiry.record_write(&entry_name);
                WriteOutcome::Stored
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Skipping cache write");
                WriteOutcome::Skipped(e.to_string())
            }
        }
    }

    fn invalidate(&self, key: &str) {
        let entry_name = self.entry_name(key);
        match fs::remove_file(self.root.join(&entry_name)) {
            Ok(()) => tracing::debug!(key, "Invalidated cache entry"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, error = %e, "Failed to remove cache entry"),
        }
        self.expiry.forget(&entry_name);
    }

    fn clear_all(&self) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.expiry.forget_prefix(&self.namespace);
                return;
            }
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to list cache directory");
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if name.starts_with(PARTIAL_PREFIX) {
                remove_abandoned_partial(&entry);
                continue;
            }
            if !name.starts_with(&self.namespace) {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(entry = name, error = %e, "Failed to remove cache entry"),
            }
        }

        // One batch covers removed files and timestamps whose payload is already gone.
        let forgotten = self.expiry.forget_prefix(&self.namespace);
        tracing::info!(namespace = %self.namespace, removed, forgotten, "Cleared cache namespace");
    }

    fn close(&self) {
        if let Err(e) = self.expiry.flush() {
            tracing::warn!(error = %e, "Failed to flush expiry store");
        }
    }
}
