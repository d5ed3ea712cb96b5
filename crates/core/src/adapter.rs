//! Site adapters: source-specific interpretation of raw feed entries.
//!
//! Every source family maps onto one of three variants. The variant decides
//! where the infohash lives in an entry (if anywhere); everything downstream
//! only sees normalized [`TorrentRecord`]s.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AdapterConfig, AdapterKind, HashField, PermalinkField};
use crate::feed::{unescape_html, RawEntry, RawFeed};
use crate::identity::{detect_info_hash, find_hex_info_hash};
use crate::record::{InfoHash, TorrentRecord};

/// A single entry that could not be normalized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdaptError {
    #[error("Entry is missing its {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAdapter {
    /// A 40-hex infohash is published in `hash_field`.
    DirectHex {
        hash_field: HashField,
        permalink: PermalinkField,
    },
    /// A base32 infohash (usually inside a magnet) is published in `hash_field`.
    Base32Magnet {
        hash_field: HashField,
        permalink: PermalinkField,
    },
    /// Only a `.torrent` enclosure is published.
    TorrentFile { permalink: PermalinkField },
}

/// Records produced from one raw feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptOutcome {
    pub records: Vec<TorrentRecord>,
    /// Entries dropped for missing fields
    pub skipped: usize,
}

impl SiteAdapter {
    pub fn from_config(config: &AdapterConfig) -> Self {
        let permalink = config.permalink;
        match config.kind {
            AdapterKind::DirectHex => SiteAdapter::DirectHex {
                hash_field: config.hash_field.unwrap_or(HashField::Link),
                permalink,
            },
            AdapterKind::Base32Magnet => SiteAdapter::Base32Magnet {
                hash_field: config.hash_field.unwrap_or(HashField::Enclosure),
                permalink,
            },
            AdapterKind::TorrentFile => SiteAdapter::TorrentFile { permalink },
        }
    }

    fn permalink(&self) -> PermalinkField {
        match *self {
            SiteAdapter::DirectHex { permalink, .. }
            | SiteAdapter::Base32Magnet { permalink, .. }
            | SiteAdapter::TorrentFile { permalink } => permalink,
        }
    }

    /// Normalize every entry of `feed`, skipping (and logging) malformed ones.
    pub fn adapt(&self, source: &str, feed: &RawFeed) -> AdaptOutcome {
        let mut outcome = AdaptOutcome::default();

        for (idx, entry) in feed.entries.iter().enumerate() {
            match self.adapt_entry(entry) {
                Ok(record) => {
                    debug!(
                        source,
                        identity = record.identity.as_ref().map(InfoHash::as_str),
                        link = %record.source_link,
                        "Adapted entry"
                    );
                    outcome.records.push(record);
                }
                Err(e) => {
                    warn!(source, entry = idx, error = %e, "Skipping malformed entry");
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }

    fn adapt_entry(&self, entry: &RawEntry) -> Result<TorrentRecord, AdaptError> {
        let title = entry
            .title
            .as_deref()
            .ok_or(AdaptError::MissingField("title"))?;
        let publish_time = entry.published.ok_or(AdaptError::MissingField("pubDate"))?;
        let source_link = match self.permalink() {
            PermalinkField::Link => entry.link.clone().ok_or(AdaptError::MissingField("link"))?,
            PermalinkField::Guid => entry.guid.clone().ok_or(AdaptError::MissingField("guid"))?,
        };

        let (identity, torrent_file_url) = match *self {
            SiteAdapter::DirectHex { hash_field, .. } => {
                (hash_text(entry, hash_field).and_then(find_hex_info_hash), None)
            }
            SiteAdapter::Base32Magnet { hash_field, .. } => {
                (hash_text(entry, hash_field).and_then(detect_info_hash), None)
            }
            SiteAdapter::TorrentFile { .. } => {
                let url = entry
                    .enclosures
                    .first()
                    .cloned()
                    .ok_or(AdaptError::MissingField("enclosure"))?;
                (None, Some(url))
            }
        };

        Ok(TorrentRecord {
            title: unescape_html(title).into_owned(),
            publish_time,
            source_link,
            identity,
            torrent_file_url,
        })
    }
}

fn hash_text(entry: &RawEntry, field: HashField) -> Option<&str> {
    match field {
        HashField::Link => entry.link.as_deref(),
        HashField::Enclosure => entry.enclosures.first().map(String::as_str),
        HashField::InfoHashTag => entry.info_hash_tag.as_deref(),
    }
}
