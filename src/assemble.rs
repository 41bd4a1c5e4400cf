//! Result Assembler: syntheses plus bookkeeping become published entries
//! and category-grouped documents.
//!
//! Entry identity is deterministic — a hash of the feed id and the
//! representative (most recent) item URL — so a re-run against unchanged
//! news refreshes entries in place. Content fields (timestamps, synthesis
//! text) are refreshed on every run regardless; only the identity is stable.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::{FeedSource, category_label};
use crate::models::{Document, NormalizedItem, PublishedEntry, SourceRef, Synthesis};
use crate::utils::{flag_emoji, stable_id};

/// Build the published entry for one feed from its items and synthesis.
pub fn assemble_entry(
    feed: &FeedSource,
    items: &[NormalizedItem],
    synthesis: Synthesis,
    updated_at: DateTime<Utc>,
) -> PublishedEntry {
    let representative = items.first();
    let id = stable_id(
        &feed.id,
        representative.map(|i| i.link.as_str()).unwrap_or(""),
    );

    let sources = items
        .iter()
        .map(|item| SourceRef {
            name: feed.name.clone(),
            country: feed.country.clone(),
            flag: feed.country.as_deref().map(flag_emoji).unwrap_or_default(),
            title: item.title.clone(),
            link: item.link.clone(),
            published_at: item
                .published_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        })
        .collect();

    PublishedEntry {
        id,
        category: feed.category.clone(),
        category_label: category_label(&feed.category),
        country: feed.country.clone(),
        source: feed.name.clone(),
        sources_count: items.len(),
        title: synthesis.title,
        summary: synthesis.summary,
        sections: synthesis.sections,
        url: representative.map(|i| i.link.clone()),
        image: items.iter().find_map(|i| i.image_url.clone()),
        updated_at: updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        model: synthesis.model,
        error: synthesis.error,
        sources,
    }
}

/// Group entries into the aggregate document plus one document per category.
///
/// Entries keep feed-configuration order; categories appear in first-seen
/// order. Category documents mirror the aggregate shape with filtered items.
pub fn build_documents(
    entries: Vec<PublishedEntry>,
    generated_at: DateTime<Utc>,
) -> (Document, Vec<(String, Document)>) {
    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut categories: Vec<String> = Vec::new();
    for entry in &entries {
        if !categories.contains(&entry.category) {
            categories.push(entry.category.clone());
        }
    }

    let per_category = categories
        .into_iter()
        .map(|category| {
            let items: Vec<PublishedEntry> = entries
                .iter()
                .filter(|e| e.category == category)
                .cloned()
                .collect();
            let doc = Document {
                generated_at: stamp.clone(),
                count: items.len(),
                items,
            };
            (category, doc)
        })
        .collect();

    let aggregate = Document {
        generated_at: stamp,
        count: entries.len(),
        items: entries,
    };
    (aggregate, per_category)
}
