//! Mock torrent downloader for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::download::{DownloadError, TorrentDownloader};

/// Mock implementation of the TorrentDownloader trait.
///
/// Queued failures for a URL are returned first, one per call; after that
/// the configured bytes are served. Unknown URLs answer HTTP 404. Every call
/// is recorded.
#[derive(Debug, Default)]
pub struct MockDownloader {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failures: Arc<RwLock<HashMap<String, VecDeque<DownloadError>>>>,
    downloads: Arc<RwLock<Vec<String>>>,
    evictions: Arc<RwLock<Vec<String>>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`.
    pub async fn set_bytes(&self, url: &str, bytes: Vec<u8>) {
        self.files.write().await.insert(url.to_string(), bytes);
    }

    /// Queue a failure for the next download of `url`.
    pub async fn fail_next(&self, url: &str, error: DownloadError) {
        self.failures
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of download calls so far.
    pub async fn download_count(&self) -> usize {
        self.downloads.read().await.len()
    }

    /// URLs requested, in call order.
    pub async fn recorded_downloads(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }

    /// URLs evicted, in call order.
    pub async fn recorded_evictions(&self) -> Vec<String> {
        self.evictions.read().await.clone()
    }
}

#[async_trait]
impl TorrentDownloader for MockDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.downloads.write().await.push(url.to_string());

        if let Some(error) = self
            .failures
            .write()
            .await
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        self.files
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or(DownloadError::Status(404))
    }

    async fn evict(&self, url: &str) -> Result<(), DownloadError> {
        self.evictions.write().await.push(url.to_string());
        self.files.write().await.remove(url);
        Ok(())
    }
}
