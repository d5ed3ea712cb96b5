pub mod adapter;
pub mod cache;
pub mod clock;
pub mod config;
pub mod download;
pub mod feed;
pub mod fetch;
pub mod identity;
pub mod merge;
pub mod orchestrator;
pub mod record;
pub mod testing;

pub use adapter::{AdaptError, AdaptOutcome, SiteAdapter};
pub use cache::{CacheError, IdentityCache, SqliteIdentityCache};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, AdapterConfig, AdapterKind, Config,
    ConfigError, HashField, PermalinkField, RetentionPolicy, SourceConfig,
};
pub use download::{DownloadError, HttpTorrentDownloader, TorrentDownloader};
pub use feed::{ChannelInfo, FeedStore, MagnetBuilder, PersistenceError, RawEntry, RawFeed};
pub use fetch::{FeedFetcher, FetchError, HttpFeedFetcher};
pub use identity::{IdentityResolver, ResolutionError};
pub use merge::{
    create_aggregate_system, merge_items, AggregateHandle, AggregateMerger, AggregateWriter,
    MergeError, MergeOutcome,
};
pub use orchestrator::{
    FeedScheduler, PipelineContext, RunError, RunReport, RunStage, RunSummary, SourcePipeline,
};
pub use record::{FeedItem, InfoHash, TorrentRecord};
