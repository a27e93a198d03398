//! Last-write timestamps for cache entries
//!
//! Timestamps live apart from the payload files: they are tiny and consulted on
//! every read, while payloads are only loaded on a fresh hit. Keys are the full
//! entry name (namespace prefix + sanitized key), the same string used as the
//! payload file name.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Key-value store of last-write times
///
/// Implementations are shared between cache instances, so they must be safe to
/// use from several threads at once.
pub trait ExpiryStore: Send + Sync {
    /// Stores `at` as the last-write time for `key`
    fn record(&self, key: &str, at: DateTime<Utc>);

    /// Returns the last-write time for `key`, if one was recorded
    fn last_write(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Removes the stored time for `key`
    fn forget(&self, key: &str);

    /// Removes every stored time whose key starts with `prefix`, returning how
    /// many were removed. Durable stores persist once for the whole batch.
    fn forget_prefix(&self, prefix: &str) -> usize;

    /// Persists pending state. Stores without durable backing do nothing.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Stores "now" as the last-write time for `key`
    fn record_write(&self, key: &str) {
        self.record(key, Utc::now());
    }
}

type Timestamps = BTreeMap<String, DateTime<Utc>>;

fn remove_prefixed(entries: &mut Timestamps, prefix: &str) -> usize {
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    before - entries.len()
}

fn lock(map: &Mutex<Timestamps>) -> MutexGuard<'_, Timestamps> {
    // A panic while holding the lock cannot leave the map half-updated.
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory expiry store, isolated per instance
#[derive(Debug, Default)]
pub struct MemoryExpiryStore {
    entries: Mutex<Timestamps>,
}

impl MemoryExpiryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded keys
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExpiryStore for MemoryExpiryStore {
    fn record(&self, key: &str, at: DateTime<Utc>) {
        lock(&self.entries).insert(key.to_string(), at);
    }

    fn last_write(&self, key: &str) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(key).copied()
    }

    fn forget(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    fn forget_prefix(&self, prefix: &str) -> usize {
        remove_prefixed(&mut lock(&self.entries), prefix)
    }
}

/// Expiry store persisted as a small JSON object on disk
///
/// Every mutation is written through immediately with a temp-file rename, so a
/// crash loses at most the mutation in progress. The file must live outside any
/// payload root: `clear_all` would otherwise treat it as a cache entry.
#[derive(Debug)]
pub struct JsonExpiryStore {
    path: PathBuf,
    entries: Mutex<Timestamps>,
}

impl JsonExpiryStore {
    /// Opens the store at `path`, loading any existing records
    ///
    /// A missing file starts an empty store. A file that cannot be parsed is
    /// discarded with a warning; losing timestamps only makes entries read as
    /// absent.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable expiry store");
                Timestamps::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Timestamps::new(),
            Err(e) => return Err(e),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened expiry store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Timestamps) -> io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn persist_best_effort(&self, entries: &Timestamps) {
        if let Err(e) = self.persist(entries) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist expiry store");
        }
    }
}

impl ExpiryStore for JsonExpiryStore {
    fn record(&self, key: &str, at: DateTime<Utc>) {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), at);
        self.persist_best_effort(&entries);
    }

    fn last_write(&self, key: &str) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(key).copied()
    }

    fn forget(&self, key: &str) {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.persist_best_effort(&entries);
        }
    }

    fn forget_prefix(&self, prefix: &str) -> usize {
        let mut entries = lock(&self.entries);
        let removed = remove_prefixed(&mut entries, prefix);
        if removed > 0 {
            self.persist_best_effort(&entries);
        }
        removed
    }

    fn flush(&self) -> io::Result<()> {
        let entries = lock(&self.entries);
        self.persist(&entries)
    }
}
