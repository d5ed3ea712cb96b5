//! RSS documents: reading source and persisted feeds, rendering output feeds.

mod escape;
mod magnet;
mod reader;
mod store;
mod writer;

pub use escape::{escape_xml, unescape_html};
pub use magnet::MagnetBuilder;
pub use reader::{parse_feed, read_feed_items, FeedParseError};
pub use store::{FeedStore, PersistenceError};
pub use writer::{render_feed, ChannelInfo};

use chrono::{DateTime, Utc};

/// A feed as returned by a source, before any site-specific interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeed {
    pub entries: Vec<RawEntry>,
}

/// One provider-specific feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    /// The entry's `<link>`.
    pub link: Option<String>,
    /// The entry's `<guid>`.
    pub guid: Option<String>,
    /// Enclosure URLs, in document order.
    pub enclosures: Vec<String>,
    /// Publish time, already converted to UTC.
    pub published: Option<DateTime<Utc>>,
    /// Value of a `<nyaa:infoHash>` extension element, if present.
    pub info_hash_tag: Option<String>,
}
