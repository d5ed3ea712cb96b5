//! Magnet URI construction for output feed enclosures.

use crate::config::MagnetConfig;
use crate::record::InfoHash;

/// Builds `magnet:?xt=urn:btih:<hash>` URIs, optionally annotated with trackers.
#[derive(Debug, Clone, Default)]
pub struct MagnetBuilder {
    trackers: Vec<String>,
}

impl MagnetBuilder {
    /// Plain magnets without tracker hints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Magnets carrying one `tr` parameter per tracker.
    pub fn with_trackers(trackers: Vec<String>) -> Self {
        Self { trackers }
    }

    pub fn from_config(config: &MagnetConfig) -> Self {
        if config.add_trackers {
            Self::with_trackers(config.trackers.clone())
        } else {
            Self::new()
        }
    }

    pub fn build(&self, identity: &InfoHash) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", identity);
        for tracker in &self.trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }
}
