//! Scheduler integration tests.
//!
//! These tests run several sources through the [`FeedScheduler`] and check
//! that sources stay independent while sharing one aggregate feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use magnetfeed_core::{
    create_aggregate_system,
    config::{AdapterConfig, AdapterKind, PermalinkField, SourceConfig},
    feed::read_feed_items,
    testing::{fixtures, FixedClock, MockDownloader, MockFetcher},
    AggregateMerger, ChannelInfo, FeedScheduler, FeedStore, IdentityResolver, MagnetBuilder,
    PipelineContext, RawFeed, RunSummary, SourcePipeline, SqliteIdentityCache,
};

struct TestHarness {
    fetcher: Arc<MockFetcher>,
    ctx: PipelineContext,
    store: FeedStore,
    writer: tokio::task::JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FeedStore::new(temp_dir.path());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
        ));
        let cache = Arc::new(SqliteIdentityCache::in_memory().expect("Failed to create cache"));
        let fetcher = Arc::new(MockFetcher::new());

        let merger = AggregateMerger::new(
            store.clone(),
            "all.xml",
            ChannelInfo {
                title: "all rss".to_string(),
                link: String::new(),
                description: "merged".to_string(),
            },
            MagnetBuilder::new(),
            100,
            clock.clone(),
        );
        let (aggregate, writer) = create_aggregate_system(merger, 4);

        let ctx = PipelineContext {
            fetcher: fetcher.clone(),
            resolver: Arc::new(IdentityResolver::new(cache, Arc::new(MockDownloader::new()))),
            store: store.clone(),
            magnets: MagnetBuilder::new(),
            aggregate,
            clock,
            fetch_max_retry: 1,
            fetch_wait: Duration::ZERO,
        };

        Self {
            fetcher,
            ctx,
            store,
            writer: tokio::spawn(writer.run()),
            _temp_dir: temp_dir,
        }
    }

    /// Register a direct-hex source whose feed holds one entry per digit.
    async fn add_source(&self, scheduler: &mut FeedScheduler, name: &str, digits: &str) {
        let source = SourceConfig {
            name: name.to_string(),
            enable: true,
            rss_url: format!("https://{}.test/rss", name),
            refresh_interval_mins: 60,
            output_filename: format!("{}.xml", name),
            adapter: AdapterConfig {
                kind: AdapterKind::DirectHex,
                hash_field: None,
                permalink: PermalinkField::Link,
            },
        };
        let entries = digits
            .chars()
            .map(|d| {
                fixtures::raw_entry(
                    &format!("{} {}", name, d),
                    &format!("https://{}.test/{}", name, d.to_string().repeat(40)),
                )
            })
            .collect();
        self.fetcher
            .set_feed(&source.rss_url, RawFeed { entries })
            .await;

        scheduler.add_source(
            SourcePipeline::new(&source, self.ctx.clone()),
            Duration::from_secs(source.refresh_interval_mins * 60),
        );
    }

    async fn aggregate_len(&self) -> usize {
        match self.store.read("all.xml").await.unwrap() {
            Some(bytes) => read_feed_items(&bytes).unwrap().len(),
            None => 0,
        }
    }

    /// Wait until the aggregate holds `expected` items.
    async fn wait_for_aggregate(&self, expected: usize) -> bool {
        for _ in 0..250 {
            if self.aggregate_len().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

#[tokio::test]
async fn test_run_all_once_isolates_failures() {
    let harness = TestHarness::new();
    let mut scheduler = FeedScheduler::new();
    harness.add_source(&mut scheduler, "good", "12").await;
    harness.add_source(&mut scheduler, "also", "3").await;

    // A source with no configured feed answers 404.
    let broken = SourceConfig {
        name: "broken".to_string(),
        enable: true,
        rss_url: "https://broken.test/rss".to_string(),
        refresh_interval_mins: 60,
        output_filename: "broken.xml".to_string(),
        adapter: AdapterConfig {
            kind: AdapterKind::DirectHex,
            hash_field: None,
            permalink: PermalinkField::Link,
        },
    };
    scheduler.add_source(
        SourcePipeline::new(&broken, harness.ctx.clone()),
        Duration::from_secs(3600),
    );

    let summary = scheduler.run_all_once().await;

    assert_eq!(
        summary,
        RunSummary {
            succeeded: 2,
            failed: 1
        }
    );
    assert_eq!(harness.aggregate_len().await, 3);
    assert!(harness.store.read("broken.xml").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_sources_lose_no_updates() {
    let harness = TestHarness::new();
    let mut scheduler = FeedScheduler::new();
    harness.add_source(&mut scheduler, "s0", "01").await;
    harness.add_source(&mut scheduler, "s1", "23").await;
    harness.add_source(&mut scheduler, "s2", "45").await;
    harness.add_source(&mut scheduler, "s3", "67").await;
    harness.add_source(&mut scheduler, "s4", "89").await;

    let loops = scheduler.start();
    assert_eq!(loops.len(), 5);
    assert!(scheduler.is_running());

    assert!(harness.wait_for_aggregate(10).await);

    scheduler.stop();
    for handle in loops {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("source loop did not stop")
            .unwrap();
    }
    assert!(!scheduler.is_running());

    for name in ["s0", "s1", "s2", "s3", "s4"] {
        let snapshot = harness
            .store
            .read(&format!("{}.xml", name))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_feed_items(&snapshot).unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_writer_exits_after_all_handles_dropped() {
    let harness = TestHarness::new();
    let mut scheduler = FeedScheduler::new();
    harness.add_source(&mut scheduler, "only", "a").await;
    scheduler.run_all_once().await;

    let TestHarness {
        ctx,
        writer,
        _temp_dir,
        ..
    } = harness;
    drop(scheduler);
    drop(ctx);

    tokio::time::timeout(Duration::from_secs(5), writer)
        .await
        .expect("aggregate writer did not exit")
        .unwrap();
}
