//! Feed and runtime configuration.
//!
//! The feed list is an immutable value loaded once at startup: either the
//! compiled-in defaults below or a YAML file passed with `--feeds`. Runtime
//! [`Settings`] come from CLI flags and environment variables; a missing API
//! credential is a configuration error and aborts the run before any output
//! is written.
//!
//! # Feed file format
//!
//! ```yaml
//! - id: bbc-world
//!   name: BBC
//!   category: monde
//!   country: GB
//!   url: https://feeds.bbci.co.uk/news/world/rss.xml
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;

/// One configured news source: identity, display name, grouping, endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    /// Stable identifier, part of every published entry id.
    pub id: String,
    /// Display name shown to readers (e.g. "Le Monde").
    pub name: String,
    /// Category tag used for grouping and per-category documents.
    pub category: String,
    /// ISO 3166-1 alpha-2 country code, when the source has one.
    #[serde(default)]
    pub country: Option<String>,
    /// RSS or Atom endpoint URL.
    pub url: String,
}

/// Runtime settings resolved from CLI flags and the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Gemini API credential. Required.
    pub api_key: String,
    /// REST API version segment, `v1` unless overridden.
    pub api_version: String,
    /// Operator-forced model identifier, tried before the default candidates.
    pub model_override: Option<String>,
    /// Output language for syntheses.
    pub language: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing Gemini API key (set GEMINI_API_KEY or pass --api-key)")]
    MissingApiKey,
    #[error("failed to read feed config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse feed config {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

impl Settings {
    /// Resolve settings from parsed CLI arguments.
    pub fn from_cli(args: &Cli) -> Result<Self, ConfigError> {
        let api_key = args
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?
            .to_string();

        Ok(Self {
            api_key,
            api_version: args.api_version.clone(),
            model_override: args
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            language: args.language.clone(),
        })
    }
}

/// The compiled-in feed list used when no `--feeds` file is given.
pub fn default_feeds() -> Vec<FeedSource> {
    fn feed(id: &str, name: &str, category: &str, country: Option<&str>, url: &str) -> FeedSource {
        FeedSource {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            country: country.map(str::to_string),
            url: url.to_string(),
        }
    }

    vec![
        feed(
            "bbc-world",
            "BBC",
            "monde",
            Some("GB"),
            "https://feeds.bbci.co.uk/news/world/rss.xml",
        ),
        feed(
            "france24",
            "France24",
            "monde",
            Some("FR"),
            "https://www.france24.com/fr/rss",
        ),
        feed(
            "the-verge",
            "The Verge",
            "tech",
            Some("US"),
            "https://www.theverge.com/rss/index.xml",
        ),
        feed(
            "lemonde-economie",
            "Le Monde",
            "economie",
            Some("FR"),
            "https://www.lemonde.fr/economie/rss_full.xml",
        ),
        feed(
            "lemonde-sport",
            "Le Monde",
            "sport",
            Some("FR"),
            "https://www.lemonde.fr/sport/rss_full.xml",
        ),
    ]
}

/// Load a feed list from a YAML file.
pub fn load_feeds(path: &str) -> Result<Vec<FeedSource>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Display label for a category tag; unknown tags pass through unchanged.
pub fn category_label(category: &str) -> String {
    match category {
        "accueil" => "Accueil",
        "pays" => "Pays",
        "monde" => "Monde",
        "economie" => "Économie",
        "tech" => "Tech",
        "sport" => "Sport",
        other => other,
    }
    .to_string()
}
