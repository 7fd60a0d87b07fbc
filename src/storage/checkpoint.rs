//! Checkpoint: the three stores loaded together and committed in order

use crate::storage::{
    DuplicatePolicy, FailureRecord, FailureStore, MergeOutcome, Record, ResultStore,
    StorageResult, WorkQueue,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Locations of the three persisted collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub work_queue: PathBuf,
    pub results: PathBuf,
    pub failures: PathBuf,
}

/// Counts describing what a commit changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub records_inserted: usize,
    pub records_replaced: usize,
    pub records_unchanged: usize,
    pub records_kept_existing: usize,
    pub failures_recorded: usize,
    pub removed_from_queue: usize,
}

/// In-memory copy of the work queue, result store and failure store
///
/// A single process owns a checkpoint for the length of a run. Nothing else
/// may write the same files concurrently; that is a precondition of running
/// the pipeline, not something enforced here.
#[derive(Debug)]
pub struct Checkpoint {
    paths: StorePaths,
    queue: WorkQueue,
    results: ResultStore,
    failures: FailureStore,
}

impl Checkpoint {
    /// Loads all three stores
    ///
    /// The work queue is read first and any problem with it is returned as an
    /// error before the output stores are touched. The output stores never
    /// fail to load; see [`crate::storage::json_file::load_or_default`].
    pub fn load(paths: StorePaths, backup_corrupt: bool) -> StorageResult<Self> {
        let queue = WorkQueue::load(&paths.work_queue)?;
        let (results, minted) = ResultStore::load(&paths.results, backup_corrupt);
        let failures = FailureStore::load(&paths.failures, backup_corrupt);

        if minted > 0 {
            tracing::info!(
                "Assigned ids to {} stored record(s) that had none; they persist at the next commit",
                minted
            );
        }

        tracing::info!(
            "Loaded checkpoint: {} pending, {} records, {} failures",
            queue.len(),
            results.len(),
            failures.len()
        );

        Ok(Self {
            paths,
            queue,
            results,
            failures,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn failures(&self) -> &FailureStore {
        &self.failures
    }

    /// Moves every parked failure back to the end of the work queue
    ///
    /// Committed immediately, queue first: a crash between the two writes
    /// leaves an item both queued and parked, never in neither.
    /// Returns the number of items appended to the queue.
    pub fn requeue_failures(&mut self) -> StorageResult<usize> {
        if self.failures.is_empty() {
            return Ok(0);
        }

        let parked = self.failures.len();
        let items = self.failures.take_items();
        let appended = self.queue.append_missing(items);

        self.queue.save(&self.paths.work_queue)?;
        self.failures.save(&self.paths.failures)?;

        tracing::info!(
            "Requeued {} of {} parked failure(s); the rest were already queued",
            appended,
            parked
        );
        Ok(appended)
    }

    /// Commits a run's outcomes
    ///
    /// `resolved` holds the queue positions (as loaded) of every item that
    /// reached a final outcome. The result store and failure store are made
    /// durable before the queue shrinks, so an item can never leave the queue
    /// without its outcome already being on disk.
    pub fn commit(
        &mut self,
        records: Vec<Record>,
        failures: Vec<FailureRecord>,
        resolved: &BTreeSet<usize>,
        policy: DuplicatePolicy,
    ) -> StorageResult<CommitSummary> {
        let mut summary = CommitSummary::default();

        for record in records {
            match self.results.merge(record, policy) {
                MergeOutcome::Inserted => summary.records_inserted += 1,
                MergeOutcome::Replaced => summary.records_replaced += 1,
                MergeOutcome::Unchanged => summary.records_unchanged += 1,
                MergeOutcome::KeptExisting => summary.records_kept_existing += 1,
            }
        }
        self.results.save(&self.paths.results)?;

        summary.failures_recorded = failures.len();
        for failure in failures {
            self.failures.merge(failure);
        }
        self.failures.save(&self.paths.failures)?;

        summary.removed_from_queue = self.queue.remove_resolved(resolved);
        self.queue.save(&self.paths.work_queue)?;

        tracing::info!(
            "Committed checkpoint: {} new records, {} updated, {} failures, {} pending",
            summary.records_inserted,
            summary.records_replaced,
            summary.failures_recorded,
            self.queue.len()
        );

        Ok(summary)
    }
}
