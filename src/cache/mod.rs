//! Response cache persisted to disk
//!
//! This module provides an object cache that stores decoded API responses as JSON
//! files with a fixed TTL. Freshness is tracked by a separate expiry store keyed by
//! the same entry name, so a stale entry is detected without touching its payload.
//! [`NullCache`] implements the same contract for running with caching disabled.

mod config;
mod expiry;
mod null;
mod object;
mod sanitize;

pub use config::{CacheConfig, DEFAULT_NAMESPACE, DEFAULT_TTL};
pub use expiry::{ExpiryStore, JsonExpiryStore, MemoryExpiryStore};
pub use null::NullCache;
pub use object::{CacheError, ObjectCache, ResponseCache, WriteOutcome};
pub use sanitize::{sanitize_key, UNSAFE_KEY_CHARS};
