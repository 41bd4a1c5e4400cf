//! RSS 2.0 and Atom parsing via `quick-xml` serde structs.
//!
//! Only the handful of fields the normalizer cares about are mapped: title,
//! link, timestamp, summary text, and an image URL from the usual places
//! (`enclosure`, `media:content`, `media:thumbnail`). Everything else in the
//! document is ignored.
//!
//! A document is parsed as RSS first, as Atom when that fails. RSS dates are
//! RFC 2822 (`pubDate`), Atom dates RFC 3339 (`published`/`updated`); both
//! forms are tried for either, since feeds routinely get this wrong.

use chrono::{DateTime, Utc};
use quick_xml::DeError;
use quick_xml::de::from_str;
use serde::Deserialize;

/// One feed entry before normalization. All fields optional; the normalizer
/// decides what is required.
#[derive(Debug, Default)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub image: Option<String>,
}

// ---------- RSS 2.0 ----------

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<TextValue>,
    link: Option<TextValue>,
    guid: Option<TextValue>,
    #[serde(rename = "pubDate")]
    pub_date: Option<TextValue>,
    description: Option<TextValue>,
    #[serde(rename = "encoded")]
    content_encoded: Option<TextValue>,
    enclosure: Option<MediaRef>,
    #[serde(rename = "content", default)]
    media_content: Vec<MediaRef>,
    #[serde(rename = "thumbnail", default)]
    media_thumbnail: Vec<MediaRef>,
}

/// Element text, tolerant of attributes (`<guid isPermaLink="false">…</guid>`).
#[derive(Debug, Deserialize)]
struct TextValue {
    #[serde(rename = "$text")]
    value: Option<String>,
}

impl TextValue {
    fn into_inner(self) -> Option<String> {
        self.value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: Option<String>,
}

// ---------- Atom ----------

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextValue>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<TextValue>,
    updated: Option<TextValue>,
    summary: Option<TextValue>,
    content: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Parse a feed document into raw entries. RSS is tried first, Atom second;
/// the RSS error is reported when neither grammar matches.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>, DeError> {
    match from_str::<Rss>(xml) {
        Ok(rss) => Ok(rss.channel.items.into_iter().map(rss_entry).collect()),
        Err(rss_err) => match from_str::<AtomFeed>(xml) {
            Ok(atom) => Ok(atom.entries.into_iter().map(atom_entry).collect()),
            Err(_) => Err(rss_err),
        },
    }
}

fn rss_entry(item: RssItem) -> RawEntry {
    let image = item
        .enclosure
        .and_then(|e| e.url)
        .or_else(|| item.media_content.into_iter().find_map(|m| m.url))
        .or_else(|| item.media_thumbnail.into_iter().find_map(|m| m.url));

    RawEntry {
        title: item.title.and_then(TextValue::into_inner),
        // Some feeds only populate guid with the article URL.
        link: item
            .link
            .and_then(TextValue::into_inner)
            .or_else(|| item.guid.and_then(TextValue::into_inner)),
        published: item
            .pub_date
            .and_then(TextValue::into_inner)
            .as_deref()
            .and_then(parse_date),
        summary: item
            .description
            .and_then(TextValue::into_inner)
            .or_else(|| item.content_encoded.and_then(TextValue::into_inner)),
        image,
    }
}

fn atom_entry(entry: AtomEntry) -> RawEntry {
    // Prefer the alternate link; fall back to the first one with an href.
    let alternate = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .and_then(|l| l.href.clone());
    let link = alternate.or_else(|| entry.links.into_iter().find_map(|l| l.href));

    RawEntry {
        title: entry.title.and_then(TextValue::into_inner),
        link,
        published: entry
            .published
            .and_then(TextValue::into_inner)
            .or_else(|| entry.updated.and_then(TextValue::into_inner))
            .as_deref()
            .and_then(parse_date),
        summary: entry
            .summary
            .and_then(TextValue::into_inner)
            .or_else(|| entry.content.and_then(TextValue::into_inner)),
        image: None,
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
