//! One ingestion run, start to finish.
//!
//! [`run`] is a function of its inputs — feed list, settings, a fetcher, a
//! generator — and returns the assembled document set. Nothing here touches
//! module-level state, which is what lets the tests drive whole runs with
//! scripted fakes.
//!
//! Per-feed failures stop at the feed boundary: a dead feed contributes the
//! no-data placeholder, an exhausted synthesis the deterministic fallback.
//! Only fatal generation errors (bad credential, malformed request) escape,
//! because continuing the run would burn every remaining feed on the same
//! misconfiguration.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, instrument, warn};

use crate::api::{Generate, GenerateError};
use crate::assemble::{assemble_entry, build_documents};
use crate::config::{FeedSource, Settings, category_label};
use crate::feeds::FetchFeed;
use crate::models::{Document, PublishedEntry};
use crate::synthesis::synthesize;

/// The assembled documents of one run.
#[derive(Debug)]
pub struct RunOutput {
    pub aggregate: Document,
    pub per_category: Vec<(String, Document)>,
}

/// Execute one ingestion run over `feeds`.
///
/// Feeds are processed in configuration order, at most `concurrency` at a
/// time. The default of 1 is deliberate: the generation endpoint rate-limits
/// aggressively, and serial requests stay under its ceiling.
#[instrument(level = "info", skip_all, fields(feeds = feeds.len()))]
pub async fn run<F, G>(
    feeds: &[FeedSource],
    settings: &Settings,
    fetcher: &F,
    generator: &G,
    concurrency: usize,
) -> Result<RunOutput, GenerateError>
where
    F: FetchFeed,
    G: Generate,
{
    let entries: Vec<PublishedEntry> = stream::iter(feeds.iter())
        .map(|feed| process_feed(feed, settings, fetcher, generator))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let degraded = entries.iter().filter(|e| e.error.is_some()).count();
    info!(entries = entries.len(), degraded, "run assembled");

    let (aggregate, per_category) = build_documents(entries, Utc::now());
    Ok(RunOutput {
        aggregate,
        per_category,
    })
}

async fn process_feed<F, G>(
    feed: &FeedSource,
    settings: &Settings,
    fetcher: &F,
    generator: &G,
) -> Result<PublishedEntry, GenerateError>
where
    F: FetchFeed,
    G: Generate,
{
    let items = match fetcher.fetch(feed).await {
        Ok(items) => items,
        Err(e) => {
            warn!(feed = %feed.id, error = %e, "feed fetch failed; proceeding with zero items");
            Vec::new()
        }
    };
    info!(feed = %feed.id, items = items.len(), "feed fetched");

    let label = category_label(&feed.category);
    let synthesis = synthesize(
        generator,
        feed,
        &label,
        &settings.language,
        settings.model_override.as_deref(),
        &items,
    )
    .await?;

    Ok(assemble_entry(feed, &items, synthesis, Utc::now()))
}
