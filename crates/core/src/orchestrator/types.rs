//! Types for the source run orchestrator.

use std::fmt;

use thiserror::Error;

use crate::feed::PersistenceError;
use crate::fetch::FetchError;
use crate::merge::{MergeError, MergeOutcome};

/// Pipeline stage of a single source run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Fetching,
    Adapting,
    Resolving,
    Merging,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Fetching => "fetching",
            RunStage::Adapting => "adapting",
            RunStage::Resolving => "resolving",
            RunStage::Merging => "merging",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong inside a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("snapshot write failed: {0}")]
    Snapshot(#[from] PersistenceError),

    #[error("aggregate merge failed: {0}")]
    Aggregate(#[from] MergeError),
}

/// A source run that ended early. Nothing after the failing stage ran.
#[derive(Debug, Error)]
#[error("source {source_name} failed while {stage}: {error}")]
pub struct RunError {
    pub source_name: String,
    pub stage: RunStage,
    #[source]
    pub error: StageError,
}

impl RunError {
    pub fn new(source_name: &str, stage: RunStage, error: impl Into<StageError>) -> Self {
        Self {
            source_name: source_name.to_string(),
            stage,
            error: error.into(),
        }
    }

    /// True when the source answered with a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.error,
            StageError::Fetch {
                source: FetchError::RateLimited,
                ..
            }
        )
    }
}

/// Counters from one completed source run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    /// Raw entries returned by the fetch
    pub fetched: usize,
    /// Records produced by the adapter
    pub adapted: usize,
    /// Entries the adapter skipped
    pub skipped: usize,
    /// Records with a resolved identity
    pub resolved: usize,
    /// Records dropped for this run
    pub unresolved: usize,
    pub snapshot_written: bool,
    pub merge: MergeOutcome,
}

/// Outcome counts of a one-shot pass over every source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}
