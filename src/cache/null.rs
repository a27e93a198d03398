//! Cache implementation that stores nothing

use serde::{de::DeserializeOwned, Serialize};

use super::object::{CacheError, ResponseCache, WriteOutcome};

/// Drop-in replacement for [`ObjectCache`](super::ObjectCache) that disables caching
///
/// Every read misses and every mutation is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl ResponseCache for NullCache {
    fn read<T: DeserializeOwned>(&self, _key: &str) -> Result<Option<T>, CacheError> {
        Ok(None)
    }

    fn write<T: Serialize>(&self, _payload: &T, _key: &str) -> WriteOutcome {
        WriteOutcome::Skipped("caching disabled".to_string())
    }

    fn invalidate(&self, _key: &str) {}

    fn clear_all(&self) {}
}
