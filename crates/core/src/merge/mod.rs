//! Merge engine.
//!
//! [`merge_items`] is the pure dedupe/sort/truncate policy. The
//! [`AggregateWriter`] owns the aggregate feed file and applies that policy
//! to one merge request at a time.

mod writer;

pub use writer::{
    create_aggregate_system, AggregateHandle, AggregateMerger, AggregateWriter, MergeError,
    MergeOutcome, MergeRequest,
};

use std::collections::HashSet;

use crate::record::FeedItem;

/// Drop every item whose identity was already seen, keeping the first.
pub fn dedup_items(items: impl IntoIterator<Item = FeedItem>) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.identity.clone()))
        .collect()
}

/// Merge a fresh batch into the previous aggregate.
///
/// Fresh items win identity conflicts because they come first. The result
/// is ordered by publish time, newest first, with ties kept in input order,
/// and holds at most `max_items` items.
pub fn merge_items(fresh: Vec<FeedItem>, previous: Vec<FeedItem>, max_items: usize) -> Vec<FeedItem> {
    let mut merged = dedup_items(fresh.into_iter().chain(previous));
    // sort_by is stable
    merged.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
    merged.truncate(max_items);
    merged
}
