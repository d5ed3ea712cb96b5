//! Identity extraction: turning feed entries into canonical infohashes.
//!
//! Infohashes are detected directly in link text (hex or base32 magnet form)
//! when a source exposes them; otherwise the [`IdentityResolver`] falls back
//! to the identity cache and finally to downloading and decoding the
//! referenced .torrent file.

mod resolver;
mod torrent;

pub use resolver::{IdentityResolver, IdentitySource, ResolutionError, ResolveOutcome, Resolved};
pub use torrent::{info_hash_from_torrent, TorrentDecodeError};

use std::str::FromStr;

use librqbit_core::Id20;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::record::InfoHash;

static HEX_INFO_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-fA-F]{40}").expect("Invalid hex infohash regex"));

static BASE32_INFO_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z2-7]{32}").expect("Invalid base32 infohash regex"));

/// Find the first 40-character hex infohash in `text`.
pub fn find_hex_info_hash(text: &str) -> Option<InfoHash> {
    HEX_INFO_HASH
        .find(text)
        .and_then(|m| InfoHash::from_hex(m.as_str()).ok())
}

/// Find the first 32-character base32 infohash in `text` and convert it to hex.
pub fn find_base32_info_hash(text: &str) -> Option<InfoHash> {
    let m = BASE32_INFO_HASH.find(text)?;
    let id = Id20::from_str(m.as_str()).ok()?;
    InfoHash::from_hex(&id.as_string()).ok()
}

/// Detect an infohash in `text`, preferring the hex form over base32.
pub fn detect_info_hash(text: &str) -> Option<InfoHash> {
    find_hex_info_hash(text).or_else(|| find_base32_info_hash(text))
}
