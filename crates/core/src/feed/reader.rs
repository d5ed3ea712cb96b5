//! RSS/Atom parsing into [`RawFeed`]s and persisted [`FeedItem`]s.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;
use tracing::debug;

use super::{RawEntry, RawFeed};
use crate::identity::detect_info_hash;
use crate::record::FeedItem;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedParseError {
    #[error("Failed to parse feed: {0}")]
    Invalid(String),
}

static ITEM_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<item[\s>].*?</item>").expect("Invalid item regex"));

static GUID_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<guid[\s>]").expect("Invalid guid regex"));

static NYAA_INFO_HASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<nyaa:infoHash>\s*([0-9a-fA-F]{40})\s*</nyaa:infoHash>")
        .expect("Invalid nyaa:infoHash regex")
});

/// Parse an RSS 2.0 (or Atom) document.
///
/// Publish dates are converted to UTC using the offset carried by the
/// document itself, never the host's local zone.
pub fn parse_feed(bytes: &[u8]) -> Result<RawFeed, FeedParseError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FeedParseError::Invalid(e.to_string()))?;

    let markup = item_markup(bytes);
    let markup_aligned = markup.len() == feed.entries.len();

    let entries = feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let extras = markup_aligned.then(|| &markup[idx]);
            // feed-rs synthesizes an id for RSS items without <guid>.
            let has_guid = extras.map_or(true, |m| m.has_guid);
            RawEntry {
                title: entry.title.map(|t| t.content),
                link: entry.links.first().map(|l| l.href.clone()),
                guid: (has_guid && !entry.id.is_empty()).then(|| entry.id.clone()),
                enclosures: entry
                    .media
                    .iter()
                    .flat_map(|m| m.content.iter())
                    .filter_map(|c| c.url.as_ref().map(|u| u.to_string()))
                    .collect(),
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc)),
                info_hash_tag: extras.and_then(|m| m.info_hash.clone()),
            }
        })
        .collect();

    Ok(RawFeed { entries })
}

/// Facts about one `<item>` that feed-rs does not report faithfully.
struct ItemMarkup {
    has_guid: bool,
    info_hash: Option<String>,
}

/// Per-item markup facts, in document order.
///
/// feed-rs drops unknown namespaced elements and invents ids for items
/// without `<guid>`, so both are read straight from the markup.
fn item_markup(bytes: &[u8]) -> Vec<ItemMarkup> {
    let text = String::from_utf8_lossy(bytes);
    ITEM_BLOCK
        .find_iter(&text)
        .map(|item| ItemMarkup {
            has_guid: GUID_ELEMENT.is_match(item.as_str()),
            info_hash: NYAA_INFO_HASH
                .captures(item.as_str())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        })
        .collect()
}

/// Reconstruct feed items from a feed document this crate rendered.
///
/// Identities are re-detected from the enclosure magnet (then the link);
/// entries missing a title, link, date or detectable identity are skipped.
pub fn read_feed_items(bytes: &[u8]) -> Result<Vec<FeedItem>, FeedParseError> {
    let feed = parse_feed(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let identity = entry
                .enclosures
                .iter()
                .chain(entry.link.iter())
                .find_map(|href| detect_info_hash(href));

            match (entry.title, entry.link, entry.published, identity) {
                (Some(title), Some(link), Some(publish_time), Some(identity)) => Some(FeedItem {
                    title,
                    publish_time,
                    link,
                    identity,
                }),
                (title, ..) => {
                    debug!(title = ?title, "Skipping persisted entry with missing fields");
                    None
                }
            }
        })
        .collect();

    Ok(items)
}
