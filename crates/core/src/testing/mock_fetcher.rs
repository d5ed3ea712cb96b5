//! Mock feed fetcher for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::feed::RawFeed;
use crate::fetch::{FeedFetcher, FetchError};

/// Mock implementation of the FeedFetcher trait.
///
/// Behaves like [`MockDownloader`](super::MockDownloader): queued failures
/// first, then the configured feed, HTTP 404 for unknown URLs.
#[derive(Debug, Default)]
pub struct MockFetcher {
    feeds: Arc<RwLock<HashMap<String, RawFeed>>>,
    failures: Arc<RwLock<HashMap<String, VecDeque<FetchError>>>>,
    fetches: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `feed` for `url` until replaced.
    pub async fn set_feed(&self, url: &str, feed: RawFeed) {
        self.feeds.write().await.insert(url.to_string(), feed);
    }

    /// Queue a failure for the next fetch of `url`.
    pub async fn fail_next(&self, url: &str, error: FetchError) {
        self.failures
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of fetch calls so far.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }
}

#[async_trait]
impl FeedFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        self.fetches.write().await.push(url.to_string());

        if let Some(error) = self
            .failures
            .write()
            .await
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        self.feeds
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}
