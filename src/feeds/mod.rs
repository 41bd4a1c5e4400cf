//! Feed retrieval: one HTTP fetcher over every configured RSS/Atom source.
//!
//! The pipeline is generic over [`FetchFeed`] so tests can inject scripted
//! item lists without a network. The production implementation downloads the
//! feed document and hands it to [`parse`] + the normalizer.
//!
//! A fetch or parse failure never fails the run: the caller treats it as
//! "this feed contributed zero items" and the synthesis layer produces its
//! no-data placeholder.

pub mod parse;

use chrono::Utc;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::api::REQUEST_TIMEOUT;
use crate::config::FeedSource;
use crate::models::NormalizedItem;
use crate::normalize::normalize_items;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http error fetching {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[error("unrecognized feed document from {url}: {source}")]
    Parse {
        url: String,
        source: quick_xml::DeError,
    },
}

/// Retrieve and normalize the items of one configured feed.
pub trait FetchFeed {
    async fn fetch(&self, feed: &FeedSource) -> Result<Vec<NormalizedItem>, FeedError>;
}

/// Production fetcher: HTTP GET with a feed-reader Accept header.
pub struct HttpFeedFetcher {
    http: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flash-info-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }
}

impl FetchFeed for HttpFeedFetcher {
    #[instrument(level = "info", skip_all, fields(feed = %feed.id))]
    async fn fetch(&self, feed: &FeedSource) -> Result<Vec<NormalizedItem>, FeedError> {
        let response = self
            .http
            .get(&feed.url)
            .header(
                ACCEPT,
                "application/rss+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.7",
            )
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| FeedError::Http {
                url: feed.url.clone(),
                source,
            })?;

        let xml = response.text().await.map_err(|source| FeedError::Http {
            url: feed.url.clone(),
            source,
        })?;

        let entries = parse::parse_feed(&xml).map_err(|source| FeedError::Parse {
            url: feed.url.clone(),
            source,
        })?;
        debug!(entries = entries.len(), "parsed feed document");

        Ok(normalize_items(&feed.url, entries, Utc::now()))
    }
}
