//! Torrent file download capability with an on-disk byte cache.
//!
//! Only used on the identity fallback path, for sources that publish a
//! `.torrent` link and nothing else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::DownloadConfig;

/// Errors from a single download attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Download timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Torrent cache I/O error: {0}")]
    Io(String),
}

/// Fetches the raw bytes of a `.torrent` file.
///
/// Implementations perform a single attempt; retrying is the caller's job.
#[async_trait]
pub trait TorrentDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError>;

    /// Forget any locally kept copy of `url` so the next download refetches it.
    async fn evict(&self, url: &str) -> Result<(), DownloadError>;
}

/// HTTP downloader that keeps every fetched file in a local cache directory.
pub struct HttpTorrentDownloader {
    client: Client,
    cache_dir: PathBuf,
    delay: Duration,
}

impl HttpTorrentDownloader {
    /// Create a downloader with a fixed per-request timeout.
    pub fn new(config: &DownloadConfig, user_agent: &str) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
            delay: Duration::from_secs(config.delay_sec),
        })
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(cache_file_name(url))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::Transport(e.to_string())
            }
        })?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TorrentDownloader for HttpTorrentDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let path = self.cache_path(url);
        if let Some(bytes) = read_cached(&path).await? {
            debug!(url, path = %path.display(), "Torrent file served from byte cache");
            return Ok(bytes);
        }

        let bytes = self.fetch(url).await?;

        write_cached(&self.cache_dir, &path, &bytes).await?;
        debug!(url, bytes = bytes.len(), "Downloaded torrent file");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(bytes)
    }

    async fn evict(&self, url: &str) -> Result<(), DownloadError> {
        let path = self.cache_path(url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(url, path = %path.display(), "Evicted torrent file from byte cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::Io(e.to_string())),
        }
    }
}

/// Write a cache entry through a temp file, fsync, then rename into place.
async fn write_cached(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::Io(e.to_string()))?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".part");
    let temp = PathBuf::from(temp);

    if let Err(e) = write_synced(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(DownloadError::Io(e.to_string()));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(DownloadError::Io(e.to_string()));
    }
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn read_cached(path: &Path) -> Result<Option<Vec<u8>>, DownloadError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DownloadError::Io(e.to_string())),
    }
}

/// File name used for a torrent URL in the byte cache: the last path segment,
/// query string included, percent-encoded so distinct URLs never share a file.
fn cache_file_name(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

    if segment.is_empty() || segment.chars().all(|c| c == '.') {
        return urlencoding::encode(without_fragment).into_owned();
    }

    match query {
        Some(query) => urlencoding::encode(&format!("{segment}?{query}")).into_owned(),
        None => urlencoding::encode(segment).into_owned(),
    }
}
