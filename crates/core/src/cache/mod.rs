//! Identity cache - remembers the infohash resolved for each entry permalink.
//!
//! Entries are written once, on the first successful resolution, and never
//! modified: the infohash of a published torrent cannot change. The cache
//! only exists to avoid downloading and hashing the same .torrent file twice.

mod sqlite;

pub use sqlite::SqliteIdentityCache;

use std::collections::HashSet;

use thiserror::Error;

use crate::record::InfoHash;

/// Errors from the identity cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt cache entry for {source_link}: {reason}")]
    CorruptEntry { source_link: String, reason: String },
}

/// Persistent `source_link -> infohash` store.
pub trait IdentityCache: Send + Sync {
    /// Look up the identity previously resolved for a permalink.
    fn get(&self, source_link: &str) -> Result<Option<InfoHash>, CacheError>;

    /// Record a resolved identity.
    ///
    /// Returns `false` if the permalink was already cached; the existing
    /// entry is left untouched.
    fn insert(&self, source_link: &str, identity: &InfoHash) -> Result<bool, CacheError>;

    /// Remove every entry whose identity is not in `live`.
    ///
    /// Returns the number of entries removed.
    fn retain_identities(&self, live: &HashSet<InfoHash>) -> Result<usize, CacheError>;

    /// Number of cached entries.
    fn len(&self) -> Result<usize, CacheError>;

    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
