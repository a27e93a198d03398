//! httpstash - fetch JSON from an HTTP API through a local response cache
//!
//! Prints the decoded response to stdout. Cached responses are served without
//! touching the network until they expire.

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;

use httpstash::cache::{NullCache, ObjectCache, ResponseCache};
use httpstash::cli::{parse_body_arg, parse_query_args, Cli, Command};
use httpstash::client::ApiClient;
use httpstash::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    let result = if cli.no_cache {
        execute(&cli, NullCache).await
    } else {
        match ObjectCache::open(cli.cache_config()) {
            Ok(cache) => execute(&cli, cache).await,
            Err(e) => Err(e.into()),
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the selected subcommand against `cache`
async fn execute<C: ResponseCache>(cli: &Cli, cache: C) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Command::Clear => {
            cache.clear_all();
            cache.close();
            Ok(())
        }
        Command::Get {
            path,
            query,
            invalidate,
        } => {
            let query = parse_query_args(query)?;
            let client = ApiClient::new(cli.client_config()?, cache);
            let result = client.get::<Value>(path, &query, *invalidate).await;
            client.shutdown();
            print_json(&result?)
        }
        Command::Post { path, data, query } => {
            let query = parse_query_args(query)?;
            let body = parse_body_arg(data)?;
            let client = ApiClient::new(cli.client_config()?, cache);
            let result = client.post::<Value, _>(path, &body, &query).await;
            client.shutdown();
            print_json(&result?)
        }
    }
}

fn print_json(value: &Value) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
