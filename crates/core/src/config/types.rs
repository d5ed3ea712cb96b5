use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub magnet: MagnetConfig,
    #[serde(default)]
    pub identity_cache: IdentityCacheConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Sources with `enable = true`, in file order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enable)
    }
}

/// Where feeds are written and how the aggregate is shaped
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_aggregate_filename")]
    pub aggregate_filename: String,
    /// Upper bound on aggregate feed length
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default = "default_description")]
    pub description: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            aggregate_filename: default_aggregate_filename(),
            max_items: default_max_items(),
            title: default_title(),
            link: String::new(),
            description: default_description(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("feeds")
}

fn default_aggregate_filename() -> String {
    "all.xml".to_string()
}

fn default_max_items() -> usize {
    200
}

fn default_title() -> String {
    "magnetfeed".to_string()
}

fn default_description() -> String {
    "Merged torrent feed".to_string()
}

/// Feed fetch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Attempts per run, including the first
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Seconds between attempts
    #[serde(default = "default_wait_sec")]
    pub wait_sec: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_retry: default_max_retry(),
            wait_sec: default_wait_sec(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("magnetfeed/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_retry() -> u32 {
    3
}

fn default_wait_sec() -> u64 {
    5
}

fn default_timeout() -> u64 {
    30
}

/// Torrent file download settings (identity fallback path)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// On-disk byte cache for downloaded `.torrent` files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Fixed per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_wait_sec")]
    pub wait_sec: u64,
    /// Pause after every network download
    #[serde(default = "default_delay_sec")]
    pub delay_sec: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            timeout_secs: default_timeout(),
            max_retry: default_max_retry(),
            wait_sec: default_wait_sec(),
            delay_sec: default_delay_sec(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("torrent_cache")
}

fn default_delay_sec() -> u64 {
    1
}

/// Magnet URI annotation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MagnetConfig {
    #[serde(default)]
    pub add_trackers: bool,
    #[serde(default)]
    pub trackers: Vec<String>,
}

/// Identity cache storage and retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityCacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            retention: RetentionPolicy::default(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("identity_cache.db")
}

/// What happens to cache entries whose identity leaves the aggregate
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Never evict.
    #[default]
    KeepAll,
    /// Keep only identities present in the aggregate or the batch just merged.
    LiveOnly,
}

/// One polled RSS source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub rss_url: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_mins: u64,
    pub output_filename: String,
    pub adapter: AdapterConfig,
}

fn default_enable() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    30
}

/// How a source's entries are interpreted
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AdapterConfig {
    pub kind: AdapterKind,
    /// Entry field carrying the infohash; defaults per kind
    #[serde(default)]
    pub hash_field: Option<HashField>,
    /// Entry field used as the permalink
    #[serde(default)]
    pub permalink: PermalinkField,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// 40-hex infohash somewhere in the entry
    DirectHex,
    /// 32-char base32 infohash inside a magnet
    Base32Magnet,
    /// Only a `.torrent` link is published
    TorrentFile,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HashField {
    Link,
    Enclosure,
    InfoHashTag,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermalinkField {
    #[default]
    Link,
    Guid,
}
