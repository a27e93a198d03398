//! httpstash
//!
//! An HTTP API client that caches decoded responses on disk. Reads go to the
//! cache first and only reach the network on a miss; every successful fetch is
//! written back with a fresh timestamp. Entries expire after a fixed TTL.

pub mod cache;
pub mod cli;
pub mod client;
pub mod error;
pub mod http;
pub mod logging;
pub mod single_flight;

pub use cache::{CacheConfig, NullCache, ObjectCache, ResponseCache};
pub use client::{ApiClient, ClientConfig};
pub use error::{ApiError, ServerErrorKind};
