//! Command-line interface definitions for Flash Info ingestion.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and model selection can be provided via environment variables,
//! which is how the scheduled CI job passes its secrets.

use clap::Parser;

/// Command-line arguments for the ingestion run.
///
/// # Examples
///
/// ```sh
/// # Default feeds, documents written under ./data
/// flash_info
///
/// # Custom feed list and output directory
/// flash_info -o ./public/data --feeds feeds.yaml
///
/// # Force a specific model before the default candidates
/// GEMINI_MODEL=gemini-2.0-flash flash_info
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for the JSON documents
    #[arg(short, long, default_value = "data")]
    pub output_dir: String,

    /// Path to a YAML feed list (defaults to the built-in feeds)
    #[arg(short, long)]
    pub feeds: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier to try before the default candidates
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    /// Gemini REST API version path segment
    #[arg(long, env = "GEMINI_API_VERSION", default_value = "v1")]
    pub api_version: String,

    /// Output language for syntheses
    #[arg(long, env = "FLASH_LANG", default_value = "fr")]
    pub language: String,

    /// How many feeds to synthesize at once; 1 keeps under upstream rate limits
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,
}
