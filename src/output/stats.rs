//! Statistics gathered from the persisted stores
//!
//! This module provides functionality for summarising a checkpoint: how much
//! work is pending, how many records were extracted and why items failed.

use crate::storage::{Checkpoint, FailureKind};
use std::collections::{BTreeMap, HashSet};

/// Store statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Work items still in the queue
    pub pending: usize,

    /// Pending items that have no url and will be parked on the next run
    pub pending_without_url: usize,

    /// Records in the result store
    pub records: usize,

    /// Entries in the failure store
    pub failures: usize,

    /// Failure store entries grouped by kind
    pub failures_by_kind: BTreeMap<FailureKind, usize>,

    /// Distinct items with an outcome in either store
    ///
    /// A url that is both parked and extracted counts once; parked items
    /// without a url each count separately.
    pub resolved: usize,
}

/// Loads statistics from a checkpoint
pub fn load_statistics(checkpoint: &Checkpoint) -> StoreStatistics {
    let queue = checkpoint.queue();

    let mut resolved_urls: HashSet<&str> = checkpoint
        .results()
        .records()
        .iter()
        .map(|r| r.source_url.as_str())
        .collect();
    let mut urlless = 0;
    for failure in checkpoint.failures().entries() {
        if failure.url().is_empty() {
            urlless += 1;
        } else {
            resolved_urls.insert(failure.url());
        }
    }

    StoreStatistics {
        pending: queue.len(),
        pending_without_url: queue.items().iter().filter(|i| i.url.is_empty()).count(),
        records: checkpoint.results().len(),
        failures: checkpoint.failures().len(),
        failures_by_kind: checkpoint.failures().counts_by_kind(),
        resolved: resolved_urls.len() + urlless,
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Pending work items: {}", stats.pending);
    if stats.pending_without_url > 0 {
        println!("    (without url: {})", stats.pending_without_url);
    }
    println!("  Extracted records: {}", stats.records);
    println!("  Parked failures: {}", stats.failures);
    println!();

    if !stats.failures_by_kind.is_empty() {
        println!("Failures by Kind:");
        // Sort kinds by count (descending)
        let mut kind_counts: Vec<_> = stats.failures_by_kind.iter().collect();
        kind_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in kind_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    let resolved = stats.resolved;
    let total = resolved + stats.pending;
    let progress = if total > 0 {
        (resolved as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Progress: {:.1}% ({} / {} items resolved)",
        progress, resolved, total
    );
}
