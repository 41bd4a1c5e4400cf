//! # Flash Info ingestion
//!
//! A news ingestion pipeline that fetches configured RSS/Atom feeds, asks
//! the Gemini API for a short synthesis per feed, and publishes the results
//! as static JSON documents consumed by the Flash Info web client.
//!
//! ## Features
//!
//! - Fetches and normalizes entries from a configurable feed list
//! - Synthesizes one title/summary per feed through an ordered list of
//!   candidate models, with retry, repair, and deterministic fallback
//! - Groups entries by category and writes an aggregate document plus one
//!   document per category, each replaced atomically
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... flash_info -o ./data
//! ```
//!
//! ## Architecture
//!
//! The run is a straight pipeline:
//! 1. **Fetch**: download each configured feed document
//! 2. **Normalize**: uniform items, required fields enforced, newest first
//! 3. **Synthesize**: one result per feed, degrading quality before
//!    availability (candidate fallback, bounded retries, repair pass)
//! 4. **Assemble + publish**: category-grouped JSON documents, atomic writes
//!
//! Exit status is non-zero only for configuration errors (missing API key,
//! unreadable feed file) or a failed aggregate write; any number of feeds
//! degrading to placeholder or fallback entries still exits zero.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod assemble;
mod cli;
mod config;
mod extract;
mod feeds;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod synthesis;
mod utils;

use api::GeminiClient;
use cli::Cli;
use config::Settings;
use feeds::HttpFeedFetcher;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("flash_info ingest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.output_dir, ?args.feeds, ?args.concurrency, "Parsed CLI arguments");

    // --- Configuration; failures here abort before any output is written ---
    let settings = match Settings::from_cli(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return Err(e.into());
        }
    };

    let feed_list = match &args.feeds {
        Some(path) => config::load_feeds(path)?,
        None => config::default_feeds(),
    };
    info!(feeds = feed_list.len(), "Loaded feed configuration");

    // Early check: ensure the output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = HttpFeedFetcher::new()?;
    let generator = GeminiClient::new(&settings)?;

    // --- Run the pipeline ---
    let output = pipeline::run(
        &feed_list,
        &settings,
        &fetcher,
        &generator,
        args.concurrency,
    )
    .await?;

    // --- Persist; only the aggregate write can fail the run ---
    outputs::json::write_documents(&args.output_dir, &output.aggregate, &output.per_category)
        .await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        entries = output.aggregate.count,
        "Execution complete"
    );

    Ok(())
}
