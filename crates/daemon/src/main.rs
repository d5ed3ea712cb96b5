use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magnetfeed_core::{
    create_aggregate_system, load_config, validate_config, AggregateMerger, ChannelInfo, Clock,
    Config, FeedFetcher, FeedScheduler, FeedStore, HttpFeedFetcher, HttpTorrentDownloader,
    IdentityCache, IdentityResolver, MagnetBuilder, PipelineContext, SourcePipeline,
    SqliteIdentityCache, SystemClock, TorrentDownloader,
};

/// Buffer size for the aggregate merge channel
const MERGE_BUFFER_SIZE: usize = 64;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn init_logging() {
    let json = env_flag("MAGNETFEED_LOG_JSON");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run() -> Result<()> {
    init_logging();

    // Determine config path
    let config_path = std::env::var("MAGNETFEED_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        output_dir = %config.output.dir.display(),
        sources = config.enabled_sources().count(),
        "Configuration loaded successfully"
    );

    let cache: Arc<dyn IdentityCache> = Arc::new(
        SqliteIdentityCache::new(&config.identity_cache.path)
            .context("Failed to open identity cache")?,
    );
    info!(
        path = %config.identity_cache.path.display(),
        retention = ?config.identity_cache.retention,
        "Identity cache initialized"
    );

    let fetcher: Arc<dyn FeedFetcher> =
        Arc::new(HttpFeedFetcher::new(&config.fetch).context("Failed to create feed fetcher")?);
    let downloader: Arc<dyn TorrentDownloader> = Arc::new(
        HttpTorrentDownloader::new(&config.download, &config.fetch.user_agent)
            .context("Failed to create torrent downloader")?,
    );
    let resolver = Arc::new(
        IdentityResolver::new(Arc::clone(&cache), downloader).with_retry(
            config.download.max_retry,
            Duration::from_secs(config.download.wait_sec),
        ),
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = FeedStore::new(&config.output.dir);
    let magnets = MagnetBuilder::from_config(&config.magnet);

    let merger = AggregateMerger::new(
        store.clone(),
        config.output.aggregate_filename.clone(),
        ChannelInfo {
            title: config.output.title.clone(),
            link: config.output.link.clone(),
            description: config.output.description.clone(),
        },
        magnets.clone(),
        config.output.max_items,
        Arc::clone(&clock),
    )
    .with_retention(Arc::clone(&cache), config.identity_cache.retention);

    let (aggregate, aggregate_writer) = create_aggregate_system(merger, MERGE_BUFFER_SIZE);
    let writer_handle = tokio::spawn(aggregate_writer.run());

    let ctx = PipelineContext {
        fetcher,
        resolver,
        store,
        magnets,
        aggregate,
        clock,
        fetch_max_retry: config.fetch.max_retry,
        fetch_wait: Duration::from_secs(config.fetch.wait_sec),
    };
    let scheduler = build_scheduler(&config, &ctx);
    drop(ctx);

    if scheduler.source_count() == 0 {
        warn!("No enabled sources configured");
    }

    if env_flag("MAGNETFEED_ONCE") {
        let summary = scheduler.run_all_once().await;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "One-shot run finished"
        );
    } else {
        let loops = scheduler.start();
        info!("magnetfeed running, press Ctrl+C to stop");

        shutdown_signal().await;
        info!("Shutdown signal received");

        scheduler.stop();
        for handle in loops {
            let _ = handle.await;
        }
    }

    // Pipelines own the remaining aggregate handles; dropping them lets the
    // writer drain its queue and exit.
    drop(scheduler);
    let _ = writer_handle.await;
    info!("Aggregate writer stopped");

    Ok(())
}

fn build_scheduler(config: &Config, ctx: &PipelineContext) -> FeedScheduler {
    let mut scheduler = FeedScheduler::new();
    for source in config.enabled_sources() {
        scheduler.add_source(
            SourcePipeline::new(source, ctx.clone()),
            Duration::from_secs(source.refresh_interval_mins.saturating_mul(60)),
        );
    }
    scheduler
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
