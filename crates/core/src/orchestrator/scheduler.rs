//! Periodic scheduling of source pipelines.
//!
//! Every source gets its own loop and interval. A run is spawned as its own
//! task so that a panic inside one run is logged and the source stays
//! scheduled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::pipeline::SourcePipeline;
use super::types::{RunReport, RunSummary};

struct ScheduledSource {
    pipeline: Arc<SourcePipeline>,
    interval: Duration,
}

/// Runs each registered source on its own interval until stopped.
pub struct FeedScheduler {
    sources: Vec<ScheduledSource>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for FeedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            sources: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Register a source. Has no effect on loops already started.
    pub fn add_source(&mut self, pipeline: SourcePipeline, interval: Duration) {
        info!(source = %pipeline.name(), interval_secs = interval.as_secs(), "Registered source schedule");
        self.sources.push(ScheduledSource {
            pipeline: Arc::new(pipeline),
            interval,
        });
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn one loop per source. Each source runs immediately, then once
    /// per interval.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return Vec::new();
        }

        info!(sources = self.sources.len(), "Starting feed scheduler");
        self.sources.iter().map(|s| self.spawn_source_loop(s)).collect()
    }

    /// Signal every loop to stop. A run in progress finishes first.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping feed scheduler");
        let _ = self.shutdown_tx.send(());
    }

    /// Run every source once, one after another.
    pub async fn run_all_once(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for source in &self.sources {
            match run_guarded(Arc::clone(&source.pipeline)).await {
                Some(_) => summary.succeeded += 1,
                None => summary.failed += 1,
            }
        }
        summary
    }

    fn spawn_source_loop(&self, source: &ScheduledSource) -> JoinHandle<()> {
        let pipeline = Arc::clone(&source.pipeline);
        let interval = source.interval;
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(source = %pipeline.name(), "Source loop started");
            let mut delay = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(source = %pipeline.name(), "Source loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        run_guarded(Arc::clone(&pipeline)).await;
                        delay = interval;
                    }
                }
            }
            info!(source = %pipeline.name(), "Source loop stopped");
        })
    }
}

/// Run a pipeline once in its own task, logging any failure.
async fn run_guarded(pipeline: Arc<SourcePipeline>) -> Option<RunReport> {
    let name = pipeline.name().to_string();
    info!(source = %name, "Source run started");

    match tokio::spawn(async move { pipeline.run_once().await }).await {
        Ok(Ok(report)) => {
            info!(
                source = %name,
                fetched = report.fetched,
                resolved = report.resolved,
                unresolved = report.unresolved,
                aggregate_total = report.merge.total,
                "Source run finished"
            );
            Some(report)
        }
        Ok(Err(e)) => {
            error!(source = %name, stage = %e.stage, error = %e.error, "Source run failed");
            None
        }
        Err(e) => {
            error!(source = %name, error = %e, "Source run aborted unexpectedly");
            None
        }
    }
}
