//! Utility functions for identifiers, string clamping, and file system checks.
//!
//! This module provides helpers used throughout the pipeline:
//! - Stable entry identifiers derived from feed + URL
//! - Char-safe truncation for excerpts, titles, and log lines
//! - Country-code to flag-emoji conversion for source badges
//! - Output directory validation

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Derive a stable entry identifier from a feed id and its representative URL.
///
/// FNV-1a over `{feed_id}|{url}`, rendered as `id_{hex}`. The hash is a pure
/// function of its inputs: re-running ingestion against an unchanged leading
/// item yields the same id, so the client updates entries in place instead of
/// duplicating them.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(stable_id("bbc-world", "https://bbc.co.uk/a"),
///            stable_id("bbc-world", "https://bbc.co.uk/a"));
/// ```
pub fn stable_id(feed_id: &str, url: &str) -> String {
    let mut hash: u32 = 2166136261;
    for byte in feed_id.bytes().chain([b'|']).chain(url.bytes()) {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    format!("id_{hash:08x}")
}

/// Convert an ISO 3166-1 alpha-2 country code to its flag emoji.
///
/// Maps each ASCII letter to the corresponding regional indicator symbol.
/// Anything that is not exactly two ASCII letters yields an empty string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(flag_emoji("FR"), "🇫🇷");
/// assert_eq!(flag_emoji("xx"), "🇽🇽");
/// assert_eq!(flag_emoji("???"), "");
/// ```
pub fn flag_emoji(code: &str) -> String {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    code.chars()
        .map(|c| {
            let offset = c.to_ascii_uppercase() as u32 - 'A' as u32;
            char::from_u32(0x1F1E6 + offset).unwrap_or('?')
        })
        .collect()
}

/// Truncate a string to at most `max` characters.
///
/// Operates on chars, not bytes, so accented and multi-byte text stays valid.
/// Used to clamp excerpts and defensive title/summary limits.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a remaining
/// byte count appended, so raw model output never floods the logs.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then performs a write test by creating
/// and immediately deleting a probe file. Called before any network work so
/// a bad output path fails the run early.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Small sync write with std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
