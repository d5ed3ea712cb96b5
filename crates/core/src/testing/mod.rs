//! Testing utilities and mock implementations of the external capabilities.
//!
//! The mocks stand in for the network (feed fetch, torrent download) and the
//! wall clock, so whole source runs can be driven in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use magnetfeed_core::testing::{fixtures, MockDownloader, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.set_feed("https://site.test/rss", feed).await;
//!
//! let downloader = MockDownloader::new();
//! downloader.fail_next("https://site.test/1.torrent", DownloadError::Timeout).await;
//! downloader
//!     .set_bytes("https://site.test/1.torrent", fixtures::torrent_bytes("a.bin", 1024, b'a'))
//!     .await;
//! ```

mod mock_clock;
mod mock_downloader;
mod mock_fetcher;

pub use mock_clock::FixedClock;
pub use mock_downloader::MockDownloader;
pub use mock_fetcher::MockFetcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::feed::RawEntry;
    use crate::record::{FeedItem, InfoHash};

    /// A bencoded single-file torrent.
    ///
    /// `name`, `length` and `piece_byte` vary the `info` dictionary, and
    /// with it the infohash.
    pub fn torrent_bytes(name: &str, length: u64, piece_byte: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"d8:announce22:http://tracker.test/an4:info");
        bytes.extend_from_slice(format!("d6:lengthi{}e", length).as_bytes());
        bytes.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
        bytes.extend_from_slice(b"12:piece lengthi16384e");
        bytes.extend_from_slice(b"6:pieces20:");
        bytes.extend_from_slice(&[piece_byte; 20]);
        bytes.extend_from_slice(b"ee");
        bytes
    }

    /// An infohash made of one repeated hex digit.
    pub fn info_hash(digit: char) -> InfoHash {
        InfoHash::from_hex(&digit.to_string().repeat(40)).expect("fixture digit must be hex")
    }

    /// A feed item whose identity is `digit` repeated.
    pub fn feed_item(title: &str, digit: char, publish_time: DateTime<Utc>) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            publish_time,
            link: format!("https://tracker.test/view/{}", digit),
            identity: info_hash(digit),
        }
    }

    /// Publish time used by [`raw_entry`].
    pub fn entry_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 24, 3, 15, 0).unwrap()
    }

    /// A raw entry with a title, link and publish time, nothing else.
    pub fn raw_entry(title: &str, link: &str) -> RawEntry {
        RawEntry {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            published: Some(entry_time()),
            ..Default::default()
        }
    }
}
