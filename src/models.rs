//! Data models for feed items, syntheses, and published documents.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`NormalizedItem`]: one feed entry after normalization, before synthesis
//! - [`SynthesisDraft`]: the JSON shape the model is asked to produce
//! - [`Synthesis`]: a completed synthesis for one feed (generated or fallback)
//! - [`PublishedEntry`] / [`Document`]: the persisted, client-facing records
//!
//! Persisted types serialize with camelCase keys to match the JSON documents
//! the web client already consumes (`feeds.json`, `{category}.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One news entry from a feed, normalized and ready for synthesis.
///
/// Entries missing a title or link are dropped during normalization, so both
/// are guaranteed non-empty here. Lives only in memory for one ingestion run.
#[derive(Debug, Clone)]
pub struct NormalizedItem {
    /// Entry headline, whitespace-collapsed.
    pub title: String,
    /// Absolute entry URL, unique within its feed.
    pub link: String,
    /// Publication timestamp, when the feed provided a parseable one.
    pub published_at: Option<DateTime<Utc>>,
    /// Plain-text excerpt, HTML stripped, truncated to a few hundred chars.
    pub snippet: String,
    /// Representative image URL from the entry's enclosure/media fields.
    pub image_url: Option<String>,
}

/// Optional structured breakdown of a synthesis.
///
/// The model is asked to separate what the sources establish from what they
/// merely suggest or leave open. Any missing key deserializes as empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Sections {
    /// Facts present in the sources.
    #[serde(default)]
    pub known: String,
    /// Claims the sources attribute or speculate about.
    #[serde(default)]
    pub assumed: String,
    /// Questions the sources leave open.
    #[serde(default)]
    pub unknown: String,
}

/// The JSON object the model is instructed to emit.
///
/// Parsed from the extracted JSON in the model's response. `title` and
/// `summary` are validated non-empty before a draft is accepted.
#[derive(Debug, Deserialize)]
pub struct SynthesisDraft {
    pub title: String,
    pub summary: String,
    pub sections: Option<Sections>,
}

/// A completed synthesis for one feed.
///
/// Invariant: `title` and `summary` are always non-empty — the placeholder
/// and fallback paths guarantee this even when no model could be reached.
/// `model` names the candidate that produced the text, or `None` when the
/// synthesis was built deterministically; `error` records why a run degraded.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub title: String,
    pub summary: String,
    pub sections: Option<Sections>,
    pub model: Option<String>,
    pub error: Option<String>,
}

/// Provenance of one source item inside a [`PublishedEntry`].
///
/// The client renders these as the "N sources" list with per-country flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// Display name of the feed (e.g. "BBC").
    pub name: String,
    /// ISO 3166-1 alpha-2 country code, if configured for the feed.
    pub country: Option<String>,
    /// Regional-indicator flag emoji for `country`, empty when unknown.
    pub flag: String,
    /// Headline of the source item.
    pub title: String,
    /// URL of the source item.
    pub link: String,
    /// Publication timestamp as an ISO-8601 string, if known.
    pub published_at: Option<String>,
}

/// The persisted, client-facing record for one feed's synthesis.
///
/// `id` is a pure function of the feed identifier and the representative
/// (most recent) item URL, so re-running ingestion against an unchanged
/// leading item refreshes the entry in place instead of duplicating it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEntry {
    /// Stable identifier, `id_` followed by a hex hash.
    pub id: String,
    /// Category tag from the feed configuration (e.g. "monde").
    pub category: String,
    /// Display label for the category (e.g. "Monde").
    pub category_label: String,
    /// Country code of the feed, if configured.
    pub country: Option<String>,
    /// Display name of the feed.
    pub source: String,
    /// How many normalized items fed the synthesis.
    pub sources_count: usize,
    /// Synthesis headline; never empty.
    pub title: String,
    /// Synthesis summary, 2–3 sentences; never empty.
    pub summary: String,
    /// Optional known/assumed/unknown breakdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Sections>,
    /// Representative link: the most recent item's URL.
    pub url: Option<String>,
    /// Representative image: the first item that carried one.
    pub image: Option<String>,
    /// When this entry was (re)generated, ISO-8601.
    pub updated_at: String,
    /// Candidate model that produced the text, `None` on fallback.
    pub model: Option<String>,
    /// Present when the entry degraded to placeholder or fallback content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-item provenance for the client's source list.
    pub sources: Vec<SourceRef>,
}

/// A persisted document: the aggregate `feeds.json` or one `{category}.json`.
///
/// Category documents mirror the aggregate shape with filtered `items`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Generation timestamp of the whole run, ISO-8601.
    pub generated_at: String,
    /// Number of entries in `items`.
    pub count: usize,
    pub items: Vec<PublishedEntry>,
}
