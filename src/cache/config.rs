//! Cache configuration

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

/// Default time-to-live for cache entries (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default namespace prefix for entry names
pub const DEFAULT_NAMESPACE: &str = "httpstash_";

/// Settings for an [`ObjectCache`](super::ObjectCache)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one payload file per entry
    pub root: PathBuf,
    /// JSON file backing the expiry store; must not live inside `root`.
    /// Only `ObjectCache::open` reads it; an injected store ignores it.
    pub expiry_file: PathBuf,
    /// How long an entry stays fresh after it was written
    pub ttl: Duration,
    /// Prefix scoping this instance's entries within `root` and the expiry store
    pub namespace: String,
    /// Run `clear_all` while constructing the cache
    pub clear_on_init: bool,
}

impl Default for CacheConfig {
    /// Uses XDG-compliant locations: `~/.cache/httpstash/responses/` for payloads
    /// and `~/.local/share/httpstash/expiry.json` for timestamps on Linux.
    /// Falls back to the system temp directory when no home directory exists.
    fn default() -> Self {
        let (root, expiry_file) = match ProjectDirs::from("", "", "httpstash") {
            Some(dirs) => (
                dirs.cache_dir().join("responses"),
                dirs.data_dir().join("expiry.json"),
            ),
            None => {
                let base = std::env::temp_dir().join("httpstash");
                (base.join("responses"), base.join("expiry.json"))
            }
        };

        Self {
            root,
            expiry_file,
            ttl: DEFAULT_TTL,
            namespace: DEFAULT_NAMESPACE.to_string(),
            clear_on_init: false,
        }
    }
}
