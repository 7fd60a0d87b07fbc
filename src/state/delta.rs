//! In-memory outcomes accumulated during a run

use crate::storage::{FailureRecord, Record};
use std::collections::BTreeSet;

/// Successes and failures resolved so far, keyed by queue position
///
/// Only the run controller writes to a delta. Each queue position can be
/// resolved once; a second outcome for the same position is rejected so an
/// item never lands in both stores.
#[derive(Debug, Default)]
pub struct RunDelta {
    records: Vec<Record>,
    failures: Vec<FailureRecord>,
    resolved: BTreeSet<usize>,
    abandoned: usize,
}

impl RunDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a success; returns false if the position was already resolved
    pub fn record_success(&mut self, index: usize, record: Record) -> bool {
        if !self.resolved.insert(index) {
            tracing::warn!("Ignoring second outcome for queue position {}", index);
            return false;
        }
        self.records.push(record);
        true
    }

    /// Records a terminal failure; returns false if the position was already resolved
    pub fn record_failure(&mut self, index: usize, failure: FailureRecord) -> bool {
        if !self.resolved.insert(index) {
            tracing::warn!("Ignoring second outcome for queue position {}", index);
            return false;
        }
        self.failures.push(failure);
        true
    }

    /// Notes an item that was claimed but left pending by cancellation
    pub fn record_abandoned(&mut self) {
        self.abandoned += 1;
    }

    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_resolved(&self, index: usize) -> bool {
        self.resolved.contains(&index)
    }

    /// Splits the delta into what the checkpoint commit needs
    pub fn into_parts(self) -> (Vec<Record>, Vec<FailureRecord>, BTreeSet<usize>) {
        (self.records, self.failures, self.resolved)
    }
}
