//! Infohash derivation from .torrent files.
//!
//! Uses librqbit-core to decode the bencoded metainfo. The infohash is the
//! SHA-1 of the `info` dictionary's bencoding; since bencoding is canonical
//! (sorted keys, minimal integers) this is the digest of the dictionary's
//! exact byte span in any well-formed file.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use thiserror::Error;

use crate::record::InfoHash;

/// Errors that can occur when decoding torrent files.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TorrentDecodeError {
    #[error("Empty torrent file")]
    Empty,

    #[error("Failed to decode torrent: {0}")]
    Malformed(String),
}

/// Extract the infohash from raw .torrent bytes.
pub fn info_hash_from_torrent(bytes: &[u8]) -> Result<InfoHash, TorrentDecodeError> {
    if bytes.is_empty() {
        return Err(TorrentDecodeError::Empty);
    }

    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| TorrentDecodeError::Malformed(e.to_string()))?;

    InfoHash::from_hex(&torrent.info_hash.as_string())
        .map_err(|e| TorrentDecodeError::Malformed(e.to_string()))
}
