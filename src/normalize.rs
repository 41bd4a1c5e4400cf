//! Item normalization: raw feed entries to a uniform, synthesis-ready shape.
//!
//! Feeds disagree about everything — HTML in summaries, entities in titles,
//! relative links, missing dates. This module flattens those differences into
//! [`NormalizedItem`]s: required fields enforced, text stripped to plain
//! prose, links made absolute, entries deduplicated and sorted newest first.

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use url::Url;

use crate::feeds::parse::RawEntry;
use crate::models::NormalizedItem;
use crate::utils::truncate_chars;

/// Entries older than this are dropped; the client only shows fresh news.
const MAX_AGE_HOURS: i64 = 36;

/// Excerpt length handed to the prompt, per item.
const SNIPPET_CHARS: usize = 400;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// script/style subtrees still count as text for the fragment parser, so they
// are cut out before parsing
static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

/// Collapse runs of whitespace (including NBSP) to single spaces and trim.
pub fn normalize_text(s: &str) -> String {
    let s = s.replace('\u{a0}', " ");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Reduce an HTML fragment to its plain text.
///
/// Parsing as a fragment also decodes entities, so `&amp;eacute;`-style
/// summaries come out readable. Script/style subtrees contribute no text.
pub fn strip_html(s: &str) -> String {
    let cleaned = RE_SCRIPT_STYLE.replace_all(s, " ");
    let fragment = Html::parse_fragment(&cleaned);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    normalize_text(&text)
}

/// Normalize one feed's raw entries.
///
/// Drops entries without a title or link, resolves relative URLs against the
/// feed endpoint, deduplicates by link, discards entries older than
/// [`MAX_AGE_HOURS`], and sorts newest first. Undated entries are kept (some
/// feeds omit timestamps entirely) and sort after dated ones.
pub fn normalize_items(
    feed_url: &str,
    entries: Vec<RawEntry>,
    now: DateTime<Utc>,
) -> Vec<NormalizedItem> {
    let base = Url::parse(feed_url).ok();
    let oldest = now - Duration::hours(MAX_AGE_HOURS);

    let mut items: Vec<NormalizedItem> = entries
        .into_iter()
        .filter_map(|entry| {
            let title = normalize_text(entry.title.as_deref().unwrap_or_default());
            let link = entry
                .link
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .and_then(|l| resolve_url(base.as_ref(), l))?;
            if title.is_empty() {
                return None;
            }

            Some(NormalizedItem {
                title,
                link,
                published_at: entry.published,
                snippet: truncate_chars(
                    &strip_html(entry.summary.as_deref().unwrap_or_default()),
                    SNIPPET_CHARS,
                ),
                image_url: entry
                    .image
                    .as_deref()
                    .and_then(|u| resolve_url(base.as_ref(), u)),
            })
        })
        .filter(|item| match item.published_at {
            Some(at) => at >= oldest,
            None => true,
        })
        .unique_by(|item| item.link.clone())
        .collect();

    // Newest first; undated entries go last.
    items.sort_by(|a, b| match (b.published_at, a.published_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    });
    items
}

fn resolve_url(base: Option<&Url>, candidate: &str) -> Option<String> {
    match Url::parse(candidate) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|b| b.join(candidate).ok()).map(|u| u.to_string())
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED_URL: &str = "https://www.example.org/rss.xml";

    fn entry(title: &str, link: &str, hours_ago: Option<i64>, now: DateTime<Utc>) -> RawEntry {
        RawEntry {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            published: hours_ago.map(|h| now - Duration::hours(h)),
            summary: Some("<p>Un &eacute;t&eacute; <b>chaud</b></p>".to_string()),
            image: None,
        }
    }

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  un\n deux\t trois "), "un deux trois");
        assert_eq!(normalize_text("a\u{a0}b"), "a b");
    }

    #[test]
    fn test_strip_html_removes_tags_and_decodes_entities() {
        assert_eq!(
            strip_html("<p>Un &eacute;t&eacute; <b>chaud</b></p>"),
            "Un été chaud"
        );
        assert_eq!(strip_html("sans balises"), "sans balises");
    }

    #[test]
    fn test_strip_html_ignores_scripts() {
        assert_eq!(strip_html("<script>alert(1)</script>ok"), "ok");
    }

    #[test]
    fn test_drops_entries_missing_title_or_link() {
        let now = test_now();
        let entries = vec![
            RawEntry {
                title: None,
                ..entry("x", "https://example.org/a", Some(1), now)
            },
            RawEntry {
                link: None,
                ..entry("Titre", "https://example.org/b", Some(1), now)
            },
            RawEntry {
                title: Some("   ".to_string()),
                ..entry("x", "https://example.org/c", Some(1), now)
            },
            entry("Gardé", "https://example.org/d", Some(1), now),
        ];
        let items = normalize_items(FEED_URL, entries, now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Gardé");
    }

    #[test]
    fn test_dedup_by_link_within_feed() {
        let now = test_now();
        let entries = vec![
            entry("Premier", "https://example.org/a", Some(1), now),
            entry("Doublon", "https://example.org/a", Some(2), now),
        ];
        let items = normalize_items(FEED_URL, entries, now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Premier");
    }

    #[test]
    fn test_age_filter_drops_stale_entries() {
        let now = test_now();
        let entries = vec![
            entry("Frais", "https://example.org/a", Some(2), now),
            entry("Périmé", "https://example.org/b", Some(48), now),
            entry("Sans date", "https://example.org/c", None, now),
        ];
        let items = normalize_items(FEED_URL, entries, now);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Frais", "Sans date"]);
    }

    #[test]
    fn test_sorted_newest_first_with_undated_last() {
        let now = test_now();
        let entries = vec![
            entry("Vieux", "https://example.org/a", Some(10), now),
            entry("Sans date", "https://example.org/b", None, now),
            entry("Récent", "https://example.org/c", Some(1), now),
        ];
        let items = normalize_items(FEED_URL, entries, now);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Récent", "Vieux", "Sans date"]);
    }

    #[test]
    fn test_snippet_is_stripped_and_bounded() {
        let now = test_now();
        let mut long = entry("Titre", "https://example.org/a", Some(1), now);
        long.summary = Some(format!("<p>{}</p>", "mot ".repeat(300)));
        let items = normalize_items(FEED_URL, vec![long], now);
        assert!(items[0].snippet.chars().count() <= SNIPPET_CHARS);
        assert!(!items[0].snippet.contains('<'));
    }

    #[test]
    fn test_relative_links_resolved_against_feed() {
        let now = test_now();
        let mut relative = entry("Titre", "/articles/42", Some(1), now);
        relative.image = Some("//cdn.example.org/img.jpg".to_string());
        let items = normalize_items(FEED_URL, vec![relative], now);
        assert_eq!(items[0].link, "https://www.example.org/articles/42");
        assert_eq!(
            items[0].image_url.as_deref(),
            Some("https://cdn.example.org/img.jpg")
        );
    }
}
