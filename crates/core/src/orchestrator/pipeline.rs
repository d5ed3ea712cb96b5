//! One source's run: fetch, adapt, resolve, merge.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::types::{RunError, RunReport, RunStage, StageError};
use crate::adapter::SiteAdapter;
use crate::clock::Clock;
use crate::config::SourceConfig;
use crate::feed::{render_feed, ChannelInfo, FeedStore, MagnetBuilder, RawFeed};
use crate::fetch::{FeedFetcher, FetchError};
use crate::identity::IdentityResolver;
use crate::merge::{dedup_items, AggregateHandle};

const SNAPSHOT_DESCRIPTION: &str = "Generated by magnetfeed";

/// Capabilities shared by every source pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub resolver: Arc<IdentityResolver>,
    pub store: FeedStore,
    pub magnets: MagnetBuilder,
    pub aggregate: AggregateHandle,
    pub clock: Arc<dyn Clock>,
    /// Fetch attempts per run
    pub fetch_max_retry: u32,
    pub fetch_wait: Duration,
}

/// Drives a single source through its stages.
pub struct SourcePipeline {
    name: String,
    rss_url: String,
    output_filename: String,
    adapter: SiteAdapter,
    ctx: PipelineContext,
}

impl SourcePipeline {
    pub fn new(source: &SourceConfig, ctx: PipelineContext) -> Self {
        Self {
            name: source.name.clone(),
            rss_url: source.rss_url.clone(),
            output_filename: source.output_filename.clone(),
            adapter: SiteAdapter::from_config(&source.adapter),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every stage once.
    ///
    /// A failure ends the run at the failing stage; files already on disk
    /// are only replaced by complete new versions. The snapshot is written
    /// before the aggregate merge, so a run that fails while merging still
    /// leaves the new snapshot in place.
    pub async fn run_once(&self) -> Result<RunReport, RunError> {
        let source = self.name.as_str();
        let mut report = RunReport {
            source: self.name.clone(),
            ..Default::default()
        };

        debug!(source, stage = %RunStage::Fetching, url = %self.rss_url, "Stage started");
        let raw = self.fetch_with_retry().await?;
        report.fetched = raw.entries.len();

        debug!(source, stage = %RunStage::Adapting, entries = report.fetched, "Stage started");
        let adapted = self.adapter.adapt(source, &raw);
        report.adapted = adapted.records.len();
        report.skipped = adapted.skipped;
        if report.fetched > 0 && report.adapted == 0 {
            warn!(
                source,
                stage = %RunStage::Adapting,
                entries = report.fetched,
                "Every entry was rejected by the adapter, feed format may have changed"
            );
        }

        debug!(source, stage = %RunStage::Resolving, records = report.adapted, "Stage started");
        let resolved = self.ctx.resolver.resolve_all(source, adapted.records).await;
        report.resolved = resolved.items.len();
        report.unresolved = resolved.unresolved;

        if resolved.items.is_empty() {
            info!(source, "No identified entries this run, feeds left untouched");
            return Ok(report);
        }

        debug!(source, stage = %RunStage::Merging, items = report.resolved, "Stage started");
        let snapshot = dedup_items(resolved.items.iter().cloned());
        let xml = render_feed(
            &self.snapshot_channel(),
            &snapshot,
            &self.ctx.magnets,
            self.ctx.clock.now(),
        );
        self.ctx
            .store
            .write_atomic(&self.output_filename, &xml)
            .await
            .map_err(|e| RunError::new(source, RunStage::Merging, e))?;
        report.snapshot_written = true;

        report.merge = self
            .ctx
            .aggregate
            .merge(source, resolved.items)
            .await
            .map_err(|e| RunError::new(source, RunStage::Merging, e))?;

        Ok(report)
    }

    fn snapshot_channel(&self) -> ChannelInfo {
        ChannelInfo {
            title: format!("{} rss", self.name),
            link: self.rss_url.clone(),
            description: SNAPSHOT_DESCRIPTION.to_string(),
        }
    }

    /// Fetch with a bounded number of attempts. Rate limiting ends the
    /// loop immediately.
    async fn fetch_with_retry(&self) -> Result<RawFeed, RunError> {
        let max_attempts = self.ctx.fetch_max_retry.max(1);
        let mut attempt = 1;

        loop {
            match self.ctx.fetcher.fetch(&self.rss_url).await {
                Ok(feed) => return Ok(feed),
                Err(e) => {
                    let give_up = !e.is_retriable() || attempt >= max_attempts;
                    if give_up {
                        if e == FetchError::RateLimited {
                            error!(
                                source = %self.name,
                                attempt,
                                "Source is rate limiting requests, skipping this run"
                            );
                        }
                        return Err(RunError::new(
                            &self.name,
                            RunStage::Fetching,
                            StageError::Fetch {
                                attempts: attempt,
                                source: e,
                            },
                        ));
                    }

                    warn!(source = %self.name, attempt, error = %e, "Fetch failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.ctx.fetch_wait).await;
                }
            }
        }
    }
}
