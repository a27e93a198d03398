//! Command-line interface parsing for httpstash
//!
//! Maps flags onto [`CacheConfig`] and [`ClientConfig`] and parses the
//! `key=value` query arguments of the `get` and `post` subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::client::ClientConfig;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// A query argument is not of the form `key=value`
    #[error("Invalid query parameter: '{0}'. Expected KEY=VALUE")]
    InvalidQuery(String),

    /// The POST body is not valid JSON
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    /// A request subcommand was given without `--base-url`
    #[error("--base-url is required to send requests")]
    MissingBaseUrl,
}

/// httpstash - HTTP API client with an on-disk response cache
#[derive(Parser, Debug)]
#[command(name = "httpstash")]
#[command(about = "Fetch JSON from an HTTP API through a local response cache")]
#[command(version)]
pub struct Cli {
    /// Base URL prepended to every request path
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory for cached payloads (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// File holding entry timestamps (defaults to the XDG data directory)
    #[arg(long, value_name = "FILE")]
    pub expiry_file: Option<PathBuf>,

    /// Seconds a cached response stays fresh
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub ttl_secs: u64,

    /// Prefix scoping this session's cache entries
    #[arg(long, value_name = "PREFIX")]
    pub namespace: Option<String>,

    /// Clear the cache namespace before doing anything else
    #[arg(long)]
    pub fresh: bool,

    /// Disable caching entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Request timeout in seconds (0 disables the timeout)
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Share one network call between concurrent requests for the same path
    #[arg(long)]
    pub single_flight: bool,

    /// Bearer token sent in the Authorization header
    #[arg(long, value_name = "TOKEN")]
    pub bearer: Option<String>,

    /// Log cache and network activity to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// GET a path and print the JSON response
    Get {
        /// Request path, also used as the cache key
        path: String,
        /// Query parameter, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
        /// Drop the cached entry before fetching
        #[arg(long)]
        invalidate: bool,
    },
    /// POST a JSON body to a path and print the JSON response
    Post {
        /// Request path, also used as the cache key
        path: String,
        /// JSON request body
        #[arg(long, value_name = "JSON")]
        data: String,
        /// Query parameter, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
    },
    /// Remove every cached entry in the namespace
    Clear,
}

/// Parses a `key=value` query argument.
///
/// The value may itself contain `=`; the key may not be empty.
pub fn parse_query_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidQuery(s.to_string())),
    }
}

/// Parses every query argument, failing on the first malformed one
pub fn parse_query_args(args: &[String]) -> Result<Vec<(String, String)>, CliError> {
    args.iter().map(|arg| parse_query_arg(arg)).collect()
}

/// Parses a POST body argument as JSON
pub fn parse_body_arg(s: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(s).map_err(|e| CliError::InvalidBody(e.to_string()))
}

impl Cli {
    /// Cache settings with CLI overrides applied over the defaults
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default();
        if let Some(dir) = &self.cache_dir {
            config.root = dir.clone();
        }
        if let Some(file) = &self.expiry_file {
            config.expiry_file = file.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        config.ttl = Duration::from_secs(self.ttl_secs);
        config.clear_on_init = self.fresh;
        config
    }

    /// Client settings; fails when no base URL was given
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        let base_url = self.base_url.clone().ok_or(CliError::MissingBaseUrl)?;
        let mut config = ClientConfig::new(base_url);
        config.timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        config.single_flight = self.single_flight;
        config.bearer_token = self.bearer.clone();
        Ok(config)
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}
