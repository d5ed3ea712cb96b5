//! Source pipeline integration tests.
//!
//! Each test drives one or more full source runs (fetch -> adapt -> resolve
//! -> merge) against mock capabilities and inspects the feeds on disk.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use magnetfeed_core::{
    create_aggregate_system,
    config::{AdapterConfig, AdapterKind, PermalinkField, SourceConfig},
    download::DownloadError,
    feed::{parse_feed, read_feed_items},
    testing::{fixtures, FixedClock, MockDownloader, MockFetcher},
    AggregateHandle, AggregateMerger, ChannelInfo, FeedItem, FeedStore, FetchError,
    IdentityCache, IdentityResolver, MagnetBuilder, PipelineContext, RawEntry, RawFeed, RunStage,
    SourcePipeline, SqliteIdentityCache,
};

const AGGREGATE: &str = "all.xml";

/// Test helper holding the mocks, the cache and the running aggregate writer.
struct TestHarness {
    fetcher: Arc<MockFetcher>,
    downloader: Arc<MockDownloader>,
    cache: Arc<SqliteIdentityCache>,
    clock: Arc<FixedClock>,
    store: FeedStore,
    aggregate: AggregateHandle,
    _writer: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(max_items: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cache = Arc::new(
            SqliteIdentityCache::new(&temp_dir.path().join("identity.db"))
                .expect("Failed to create identity cache"),
        );
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
        ));
        let store = FeedStore::new(temp_dir.path().join("feeds"));

        let merger = AggregateMerger::new(
            store.clone(),
            AGGREGATE,
            ChannelInfo {
                title: "all rss".to_string(),
                link: String::new(),
                description: "merged".to_string(),
            },
            MagnetBuilder::new(),
            max_items,
            clock.clone(),
        );
        let (aggregate, writer) = create_aggregate_system(merger, 8);

        Self {
            fetcher: Arc::new(MockFetcher::new()),
            downloader: Arc::new(MockDownloader::new()),
            cache,
            clock,
            store,
            aggregate,
            _writer: tokio::spawn(writer.run()),
            _temp_dir: temp_dir,
        }
    }

    fn pipeline(&self, source: &SourceConfig) -> SourcePipeline {
        let resolver = IdentityResolver::new(self.cache.clone(), self.downloader.clone())
            .with_retry(3, Duration::ZERO);
        SourcePipeline::new(
            source,
            PipelineContext {
                fetcher: self.fetcher.clone(),
                resolver: Arc::new(resolver),
                store: self.store.clone(),
                magnets: MagnetBuilder::new(),
                aggregate: self.aggregate.clone(),
                clock: self.clock.clone(),
                fetch_max_retry: 3,
                fetch_wait: Duration::ZERO,
            },
        )
    }

    async fn file(&self, filename: &str) -> Option<Vec<u8>> {
        self.store.read(filename).await.expect("Failed to read feed file")
    }

    async fn aggregate_items(&self) -> Vec<FeedItem> {
        let bytes = self.file(AGGREGATE).await.expect("Aggregate feed missing");
        read_feed_items(&bytes).expect("Aggregate feed unreadable")
    }
}

fn source(name: &str, kind: AdapterKind) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        enable: true,
        rss_url: format!("https://{}.test/rss", name),
        refresh_interval_mins: 30,
        output_filename: format!("{}.xml", name),
        adapter: AdapterConfig {
            kind,
            hash_field: None,
            permalink: PermalinkField::Link,
        },
    }
}

fn hex_entry(title: &str, digit: char, published: DateTime<Utc>) -> RawEntry {
    let mut entry = fixtures::raw_entry(
        title,
        &format!("https://site.test/view/{}", digit.to_string().repeat(40)),
    );
    entry.published = Some(published);
    entry
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 4, d, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_fresher_source_replaces_stale_title() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);
    let b = source("b", AdapterKind::DirectHex);

    harness
        .fetcher
        .set_feed(&b.rss_url, RawFeed {
            entries: vec![hex_entry("Stale title from B", 'a', day(1))],
        })
        .await;
    harness.pipeline(&b).run_once().await.unwrap();

    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed {
            entries: vec![hex_entry("Fresh title from A", 'a', day(2))],
        })
        .await;
    let report = tokio_test::assert_ok!(harness.pipeline(&a).run_once().await);

    assert_eq!(report.merge.added, 0);
    let items = harness.aggregate_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].identity, fixtures::info_hash('a'));
    assert_eq!(items[0].title, "Fresh title from A");
    assert_eq!(items[0].publish_time, day(2));
}

#[tokio::test]
async fn test_torrent_file_retried_then_cached() {
    let harness = TestHarness::new(50);
    let rewrite = source("acgrip", AdapterKind::TorrentFile);
    let torrent_url = "https://acgrip.test/t/100.torrent";

    let mut entry = fixtures::raw_entry("Episode 01", "https://acgrip.test/t/100");
    entry.enclosures = vec![torrent_url.to_string()];
    harness
        .fetcher
        .set_feed(&rewrite.rss_url, RawFeed { entries: vec![entry] })
        .await;
    harness.downloader.fail_next(torrent_url, DownloadError::Timeout).await;
    harness
        .downloader
        .fail_next(torrent_url, DownloadError::Transport("reset".into()))
        .await;
    harness
        .downloader
        .set_bytes(torrent_url, fixtures::torrent_bytes("test.bin", 1024, b'a'))
        .await;

    let report = harness.pipeline(&rewrite).run_once().await.unwrap();

    assert_eq!(report.resolved, 1);
    assert_eq!(harness.downloader.download_count().await, 3);
    let items = harness.aggregate_items().await;
    assert_eq!(
        items[0].identity.as_str(),
        "4e649c4fab84c8a840933785cd41848d7fcc5d73"
    );
    assert_eq!(
        harness.cache.get("https://acgrip.test/t/100").unwrap(),
        Some(items[0].identity.clone())
    );

    // Second run: served from the identity cache.
    let report = harness.pipeline(&rewrite).run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(harness.downloader.download_count().await, 3);
}

#[tokio::test]
async fn test_unresolvable_entry_dropped_not_fatal() {
    let harness = TestHarness::new(50);
    let rewrite = source("bangumimoe", AdapterKind::TorrentFile);

    let mut broken = fixtures::raw_entry("Broken", "https://moe.test/t/1");
    broken.enclosures = vec!["https://moe.test/t/1.torrent".to_string()];
    let mut good = fixtures::raw_entry("Good", "https://moe.test/t/2");
    good.enclosures = vec!["https://moe.test/t/2.torrent".to_string()];
    harness
        .fetcher
        .set_feed(&rewrite.rss_url, RawFeed { entries: vec![broken, good] })
        .await;
    harness
        .downloader
        .set_bytes("https://moe.test/t/1.torrent", b"not bencode".to_vec())
        .await;
    harness
        .downloader
        .set_bytes(
            "https://moe.test/t/2.torrent",
            fixtures::torrent_bytes("other.bin", 2048, b'b'),
        )
        .await;

    let report = harness.pipeline(&rewrite).run_once().await.unwrap();

    assert_eq!(report.resolved, 1);
    assert_eq!(report.unresolved, 1);
    let items = harness.aggregate_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].identity.as_str(),
        "e800b4a6520e980806078321deb41069eb9e6eda"
    );
}

#[tokio::test]
async fn test_empty_fetch_leaves_aggregate_byte_identical() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);

    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed {
            entries: vec![hex_entry("One", '1', day(1))],
        })
        .await;
    harness.pipeline(&a).run_once().await.unwrap();
    let aggregate_before = harness.file(AGGREGATE).await.unwrap();
    let snapshot_before = harness.file("a.xml").await.unwrap();

    harness.clock.advance(chrono::Duration::hours(1));
    harness.fetcher.set_feed(&a.rss_url, RawFeed::default()).await;
    let report = harness.pipeline(&a).run_once().await.unwrap();

    assert_eq!(report.fetched, 0);
    assert!(!report.merge.written);
    assert_eq!(harness.file(AGGREGATE).await.unwrap(), aggregate_before);
    assert_eq!(harness.file("a.xml").await.unwrap(), snapshot_before);
}

#[tokio::test]
async fn test_rate_limited_fetch_not_retried() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);
    harness.fetcher.fail_next(&a.rss_url, FetchError::RateLimited).await;
    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed {
            entries: vec![hex_entry("One", '1', day(1))],
        })
        .await;

    let err = harness.pipeline(&a).run_once().await.unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(err.stage, RunStage::Fetching);
    assert_eq!(harness.fetcher.fetch_count().await, 1);
    assert!(harness.file(AGGREGATE).await.is_none());
    assert!(harness.file("a.xml").await.is_none());
}

#[tokio::test]
async fn test_transient_fetch_errors_retried() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);
    harness.fetcher.fail_next(&a.rss_url, FetchError::Status(503)).await;
    harness.fetcher.fail_next(&a.rss_url, FetchError::Timeout).await;
    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed {
            entries: vec![hex_entry("One", '1', day(1))],
        })
        .await;

    let report = harness.pipeline(&a).run_once().await.unwrap();

    assert_eq!(harness.fetcher.fetch_count().await, 3);
    assert_eq!(report.resolved, 1);
}

#[tokio::test]
async fn test_fetch_exhaustion_persists_nothing() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);
    for _ in 0..3 {
        harness
            .fetcher
            .fail_next(&a.rss_url, FetchError::Transport("refused".into()))
            .await;
    }

    let err = harness.pipeline(&a).run_once().await.unwrap_err();

    assert_eq!(err.stage, RunStage::Fetching);
    assert!(!err.is_rate_limited());
    assert_eq!(harness.fetcher.fetch_count().await, 3);
    assert!(harness.file(AGGREGATE).await.is_none());
}

#[tokio::test]
async fn test_aggregate_bounded_and_sorted() {
    let harness = TestHarness::new(3);
    let a = source("a", AdapterKind::DirectHex);
    let b = source("b", AdapterKind::DirectHex);

    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed {
            entries: vec![
                hex_entry("a1", '1', day(1)),
                hex_entry("a4", '4', day(4)),
                hex_entry("a2", '2', day(2)),
            ],
        })
        .await;
    harness
        .fetcher
        .set_feed(&b.rss_url, RawFeed {
            entries: vec![hex_entry("b5", '5', day(5)), hex_entry("b3", '3', day(3))],
        })
        .await;

    harness.pipeline(&a).run_once().await.unwrap();
    let report = harness.pipeline(&b).run_once().await.unwrap();

    assert_eq!(report.merge.total, 3);
    let titles: Vec<_> = harness
        .aggregate_items()
        .await
        .into_iter()
        .map(|i| i.title)
        .collect();
    assert_eq!(titles, vec!["b5", "a4", "b3"]);

    // The snapshot is only what this source returned, in feed order.
    let snapshot = read_feed_items(&harness.file("b.xml").await.unwrap()).unwrap();
    let snapshot_titles: Vec<_> = snapshot.into_iter().map(|i| i.title).collect();
    assert_eq!(snapshot_titles, vec!["b5", "b3"]);
}

#[tokio::test]
async fn test_offset_dates_stored_as_utc() {
    let harness = TestHarness::new(50);
    let dmhy = source("dmhy", AdapterKind::Base32Magnet);
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>dmhy</title><link>https://dmhy.test</link><description>d</description>
<item>
<title>Show &amp;amp; Friends 01</title>
<link>https://dmhy.test/topics/view/1.html</link>
<pubDate>Mon, 24 Apr 2023 03:15:00 +0800</pubDate>
<enclosure url="magnet:?xt=urn:btih:CH3K3DWFFIUYJK5K7V6DWULFAN4FYIDS&amp;dn=show" length="1" type="application/x-bittorrent"/>
</item>
</channel></rss>"#;
    harness
        .fetcher
        .set_feed(&dmhy.rss_url, parse_feed(xml.as_bytes()).unwrap())
        .await;

    harness.pipeline(&dmhy).run_once().await.unwrap();

    let items = harness.aggregate_items().await;
    assert_eq!(items[0].title, "Show & Friends 01");
    assert_eq!(
        items[0].publish_time,
        Utc.with_ymd_and_hms(2023, 4, 23, 19, 15, 0).unwrap()
    );
    assert_eq!(
        items[0].identity.as_str(),
        "11f6ad8ec52a2984abaafd7c3b516503785c2072"
    );
    let raw = String::from_utf8(harness.file(AGGREGATE).await.unwrap()).unwrap();
    assert!(raw.contains("<pubDate>Sun, 23 Apr 2023 19:15:00 GMT</pubDate>"));
}

#[tokio::test]
async fn test_all_entries_rejected_is_not_fatal() {
    let harness = TestHarness::new(50);
    let a = source("a", AdapterKind::DirectHex);
    let mut undated = fixtures::raw_entry("No date", "https://a.test/1");
    undated.published = None;
    harness
        .fetcher
        .set_feed(&a.rss_url, RawFeed { entries: vec![undated] })
        .await;

    let report = harness.pipeline(&a).run_once().await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.adapted, 0);
    assert_eq!(report.skipped, 1);
    assert!(!report.snapshot_written);
    assert!(harness.file(AGGREGATE).await.is_none());
}
