//! Source run orchestration.
//!
//! Each source runs its own pipeline on its own schedule:
//! - **Fetching**: bounded retry, rate limiting is never retried
//! - **Adapting** and **Resolving**: per-entry failures drop only that entry
//! - **Merging**: snapshot written in the source task, aggregate through the
//!   single aggregate writer

mod pipeline;
mod scheduler;
mod types;

pub use pipeline::{PipelineContext, SourcePipeline};
pub use scheduler::FeedScheduler;
pub use types::{RunError, RunReport, RunStage, RunSummary, StageError};
