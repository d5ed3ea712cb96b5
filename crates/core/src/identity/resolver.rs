//! Identity resolution with cache and torrent-file fallback.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::IdentityCache;
use crate::download::{DownloadError, TorrentDownloader};
use crate::record::{FeedItem, InfoHash, TorrentRecord};

use super::{find_base32_info_hash, find_hex_info_hash, info_hash_from_torrent, TorrentDecodeError};

/// Why a record could not be given an identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Entry exposes no infohash and no torrent file")]
    NoSource,

    #[error("Torrent download failed after {attempts} attempts: {source}")]
    Download {
        attempts: u32,
        #[source]
        source: DownloadError,
    },

    #[error(transparent)]
    Decode(#[from] TorrentDecodeError),
}

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// The site adapter already extracted it.
    Entry,
    /// A hex infohash found in the entry's links.
    LinkHex,
    /// A base32 infohash found in the entry's links.
    LinkBase32,
    /// A previous run resolved this permalink.
    Cache,
    /// Downloaded and hashed the .torrent file.
    TorrentFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub identity: InfoHash,
    pub source: IdentitySource,
}

/// Result of resolving a whole batch.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    /// Records that received an identity, in input order.
    pub items: Vec<FeedItem>,
    /// Records dropped for this run.
    pub unresolved: usize,
}

/// Resolves record identities, preferring cheap sources over downloads.
pub struct IdentityResolver {
    cache: Arc<dyn IdentityCache>,
    downloader: Arc<dyn TorrentDownloader>,
    max_retry: u32,
    retry_wait: Duration,
}

impl IdentityResolver {
    pub fn new(cache: Arc<dyn IdentityCache>, downloader: Arc<dyn TorrentDownloader>) -> Self {
        Self {
            cache,
            downloader,
            max_retry: 3,
            retry_wait: Duration::from_secs(5),
        }
    }

    /// Set the download retry bound and the delay between attempts.
    pub fn with_retry(mut self, max_retry: u32, retry_wait: Duration) -> Self {
        self.max_retry = max_retry.max(1);
        self.retry_wait = retry_wait;
        self
    }

    /// Resolve the identity of a single record.
    ///
    /// Order of preference: identity already on the record, hex then base32
    /// infohash in the record's links, the identity cache, and finally the
    /// torrent file. Only the last step touches the network, and only it
    /// writes to the cache.
    pub async fn resolve(&self, record: &TorrentRecord) -> Result<Resolved, ResolutionError> {
        if let Some(identity) = &record.identity {
            return Ok(Resolved {
                identity: identity.clone(),
                source: IdentitySource::Entry,
            });
        }

        let links: Vec<&str> = std::iter::once(record.source_link.as_str())
            .chain(record.torrent_file_url.as_deref())
            .collect();

        if let Some(identity) = links.iter().find_map(|l| find_hex_info_hash(l)) {
            return Ok(Resolved {
                identity,
                source: IdentitySource::LinkHex,
            });
        }

        if let Some(identity) = links.iter().find_map(|l| find_base32_info_hash(l)) {
            return Ok(Resolved {
                identity,
                source: IdentitySource::LinkBase32,
            });
        }

        match self.cache.get(&record.source_link) {
            Ok(Some(identity)) => {
                return Ok(Resolved {
                    identity,
                    source: IdentitySource::Cache,
                })
            }
            Ok(None) => {}
            Err(e) => warn!(link = %record.source_link, error = %e, "Identity cache lookup failed"),
        }

        let Some(url) = record.torrent_file_url.as_deref() else {
            return Err(ResolutionError::NoSource);
        };

        let bytes = self.download_with_retry(url).await?;
        let identity = match info_hash_from_torrent(&bytes) {
            Ok(identity) => identity,
            Err(e) => {
                if let Err(evict_err) = self.downloader.evict(url).await {
                    warn!(url, error = %evict_err, "Failed to evict undecodable torrent file");
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.cache.insert(&record.source_link, &identity) {
            warn!(link = %record.source_link, error = %e, "Failed to cache resolved identity");
        }

        Ok(Resolved {
            identity,
            source: IdentitySource::TorrentFile,
        })
    }

    /// Resolve a batch sequentially, dropping records that fail.
    pub async fn resolve_all(&self, source: &str, records: Vec<TorrentRecord>) -> ResolveOutcome {
        let mut outcome = ResolveOutcome {
            items: Vec::with_capacity(records.len()),
            unresolved: 0,
        };

        for record in records {
            match self.resolve(&record).await {
                Ok(resolved) => {
                    debug!(
                        source,
                        identity = %resolved.identity,
                        via = ?resolved.source,
                        "Resolved identity"
                    );
                    outcome.items.push(record.into_item(resolved.identity));
                }
                Err(ResolutionError::Decode(e)) => {
                    warn!(
                        source,
                        link = %record.source_link,
                        error = %e,
                        "Torrent file could not be decoded, entry skipped"
                    );
                    outcome.unresolved += 1;
                }
                Err(e) => {
                    warn!(
                        source,
                        link = %record.source_link,
                        error = %e,
                        "Identity unresolved, entry skipped"
                    );
                    outcome.unresolved += 1;
                }
            }
        }

        outcome
    }

    async fn download_with_retry(&self, url: &str) -> Result<Vec<u8>, ResolutionError> {
        let mut attempt = 1;
        loop {
            match self.downloader.download(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt >= self.max_retry => {
                    return Err(ResolutionError::Download {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    debug!(url, attempt, error = %e, "Torrent download failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_wait).await;
                }
            }
        }
    }
}
