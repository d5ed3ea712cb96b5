//! Torrent records flowing through the pipeline.
//!
//! A [`TorrentRecord`] is what a site adapter produces from a raw feed entry.
//! Once its identity is known it becomes a [`FeedItem`], which is the only
//! shape the merge engine and the feed writer accept.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a hex-encoded SHA-1 infohash.
pub const INFO_HASH_HEX_LEN: usize = 40;

/// Returned when a string is not a 40-character hex infohash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid infohash: {0:?}")]
pub struct InvalidInfoHash(pub String);

/// A BitTorrent v1 infohash, always stored as 40 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash(String);

impl InfoHash {
    /// Parse a hex infohash, normalizing to lowercase.
    pub fn from_hex(s: &str) -> Result<Self, InvalidInfoHash> {
        if s.len() != INFO_HASH_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidInfoHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Build an infohash from the raw 20-byte digest.
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InfoHash {
    type Error = InvalidInfoHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<InfoHash> for String {
    fn from(value: InfoHash) -> Self {
        value.0
    }
}

/// A normalized feed entry, possibly still waiting for its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentRecord {
    /// Display title, HTML entities already decoded.
    pub title: String,
    /// Publish time in UTC.
    pub publish_time: DateTime<Utc>,
    /// Canonical permalink; the identity cache key.
    pub source_link: String,
    /// Infohash when the entry exposed one.
    pub identity: Option<InfoHash>,
    /// `.torrent` download URL for sources that only advertise the file.
    pub torrent_file_url: Option<String>,
}

impl TorrentRecord {
    /// Attach a resolved identity, producing a mergeable item.
    pub fn into_item(self, identity: InfoHash) -> FeedItem {
        FeedItem {
            title: self.title,
            publish_time: self.publish_time,
            link: self.source_link,
            identity,
        }
    }
}

/// A fully identified record, as persisted in snapshot and aggregate feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub link: String,
    pub identity: InfoHash,
}
