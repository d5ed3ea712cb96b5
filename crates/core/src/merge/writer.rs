use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::merge_items;
use crate::cache::IdentityCache;
use crate::clock::Clock;
use crate::config::RetentionPolicy;
use crate::feed::{read_feed_items, render_feed, ChannelInfo, FeedStore, MagnetBuilder, PersistenceError};
use crate::record::{FeedItem, InfoHash};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Aggregate writer is not running")]
    WriterClosed,
}

/// Result of one merge request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Whether the aggregate file was rewritten
    pub written: bool,
    /// Items in the aggregate after the merge
    pub total: usize,
    /// Batch identities that were not in the previous aggregate
    pub added: usize,
    /// Identity cache entries pruned by the retention policy
    pub pruned: usize,
}

/// Applies merge requests to the aggregate feed file.
pub struct AggregateMerger {
    store: FeedStore,
    filename: String,
    channel: ChannelInfo,
    magnets: MagnetBuilder,
    max_items: usize,
    clock: Arc<dyn Clock>,
    retention: Option<(Arc<dyn IdentityCache>, RetentionPolicy)>,
}

impl AggregateMerger {
    pub fn new(
        store: FeedStore,
        filename: impl Into<String>,
        channel: ChannelInfo,
        magnets: MagnetBuilder,
        max_items: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            filename: filename.into(),
            channel,
            magnets,
            max_items,
            clock,
            retention: None,
        }
    }

    /// Prune `cache` according to `policy` after every aggregate write.
    pub fn with_retention(mut self, cache: Arc<dyn IdentityCache>, policy: RetentionPolicy) -> Self {
        self.retention = Some((cache, policy));
        self
    }

    /// Merge `batch` into the persisted aggregate.
    ///
    /// An empty batch leaves the file untouched. A missing or unreadable
    /// aggregate counts as empty.
    pub async fn merge(&self, source: &str, batch: Vec<FeedItem>) -> Result<MergeOutcome, MergeError> {
        if batch.is_empty() {
            debug!(source, "Empty batch, aggregate left untouched");
            return Ok(MergeOutcome::default());
        }

        let previous = self.load_previous(source).await?;
        let previous_ids: HashSet<&InfoHash> = previous.iter().map(|i| &i.identity).collect();
        let added = batch
            .iter()
            .filter(|i| !previous_ids.contains(&i.identity))
            .count();
        drop(previous_ids);

        let batch_ids: HashSet<InfoHash> = batch.iter().map(|i| i.identity.clone()).collect();
        let merged = merge_items(batch, previous, self.max_items);

        let xml = render_feed(&self.channel, &merged, &self.magnets, self.clock.now());
        self.store.write_atomic(&self.filename, &xml).await?;

        let pruned = self.apply_retention(source, &merged, batch_ids);

        Ok(MergeOutcome {
            written: true,
            total: merged.len(),
            added,
            pruned,
        })
    }

    async fn load_previous(&self, source: &str) -> Result<Vec<FeedItem>, MergeError> {
        let Some(bytes) = self.store.read(&self.filename).await? else {
            info!(source, file = %self.filename, "No aggregate feed yet, starting fresh");
            return Ok(Vec::new());
        };

        match read_feed_items(&bytes) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(source, file = %self.filename, error = %e, "Aggregate feed unreadable, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn apply_retention(&self, source: &str, merged: &[FeedItem], mut live: HashSet<InfoHash>) -> usize {
        let Some((cache, RetentionPolicy::LiveOnly)) = &self.retention else {
            return 0;
        };

        live.extend(merged.iter().map(|i| i.identity.clone()));
        match cache.retain_identities(&live) {
            Ok(pruned) => {
                if pruned > 0 {
                    debug!(source, pruned, "Pruned identity cache");
                }
                pruned
            }
            Err(e) => {
                warn!(source, error = %e, "Failed to prune identity cache");
                0
            }
        }
    }
}

/// A merge request queued for the aggregate writer.
pub struct MergeRequest {
    pub source: String,
    pub batch: Vec<FeedItem>,
    pub reply: oneshot::Sender<Result<MergeOutcome, MergeError>>,
}

/// Background task that owns the aggregate feed and applies merges serially.
pub struct AggregateWriter {
    rx: mpsc::Receiver<MergeRequest>,
    merger: AggregateMerger,
}

impl AggregateWriter {
    pub fn new(rx: mpsc::Receiver<MergeRequest>, merger: AggregateMerger) -> Self {
        Self { rx, merger }
    }

    /// Run the writer, consuming requests until every handle is dropped
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Aggregate writer started");

        while let Some(request) = self.rx.recv().await {
            let result = self.merger.merge(&request.source, request.batch).await;
            match &result {
                Ok(outcome) if outcome.written => info!(
                    source = %request.source,
                    total = outcome.total,
                    added = outcome.added,
                    "Aggregate feed updated"
                ),
                Ok(_) => {}
                Err(e) => warn!(source = %request.source, error = %e, "Aggregate merge failed"),
            }
            // The requester may have given up waiting.
            let _ = request.reply.send(result);
        }

        info!("Aggregate writer shutting down");
    }
}

/// Handle for submitting merges to the aggregate writer
///
/// This is cheaply cloneable; every source task holds one.
#[derive(Clone)]
pub struct AggregateHandle {
    tx: mpsc::Sender<MergeRequest>,
}

impl AggregateHandle {
    pub fn new(tx: mpsc::Sender<MergeRequest>) -> Self {
        Self { tx }
    }

    /// Queue a merge and wait for the writer to apply it.
    pub async fn merge(&self, source: &str, batch: Vec<FeedItem>) -> Result<MergeOutcome, MergeError> {
        let (reply, rx) = oneshot::channel();
        let request = MergeRequest {
            source: source.to_string(),
            batch,
            reply,
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| MergeError::WriterClosed)?;
        rx.await.map_err(|_| MergeError::WriterClosed)?
    }
}

/// Create the aggregate writer and its first handle
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into each source task.
pub fn create_aggregate_system(
    merger: AggregateMerger,
    buffer_size: usize,
) -> (AggregateHandle, AggregateWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AggregateHandle::new(tx), AggregateWriter::new(rx, merger))
}
