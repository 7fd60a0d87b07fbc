//! Output module for operator-facing summaries
//!
//! This module handles:
//! - Statistics over the persisted stores (`--stats`)
//! - The end-of-run report printed after a pass

pub mod stats;

pub use stats::{load_statistics, print_statistics, StoreStatistics};

use crate::pipeline::RunReport;

/// Prints a run report to stdout
pub fn print_run_report(report: &RunReport) {
    println!("=== Run Report ===\n");

    println!("Outcome: {}", report.state);
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    if report.requeued > 0 {
        println!("  Requeued failures: {}", report.requeued);
    }
    println!("  Items loaded: {}", report.loaded);
    println!("  Items attempted: {}", report.attempted);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed: {}", report.failed);
    println!("  Abandoned: {}", report.abandoned);
    println!("  Remaining in queue: {}", report.remaining);
    println!();

    println!("Result Store:");
    println!("  New records: {}", report.commit.records_inserted);
    println!("  Updated records: {}", report.commit.records_replaced);
    println!("  Unchanged records: {}", report.commit.records_unchanged);
    if report.commit.records_kept_existing > 0 {
        println!(
            "  Conflicts kept as stored: {}",
            report.commit.records_kept_existing
        );
    }
}
