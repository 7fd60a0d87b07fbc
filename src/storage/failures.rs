//! The failure store of parked work items

use crate::storage::json_file::{load_or_default, write_json_atomic};
use crate::storage::{FailureKind, FailureRecord, StorageResult, WorkItem};
use std::collections::BTreeMap;
use std::path::Path;

/// Items that exhausted the retry budget, one entry per url
#[derive(Debug, Clone, Default)]
pub struct FailureStore {
    entries: Vec<FailureRecord>,
}

impl FailureStore {
    pub fn from_entries(entries: Vec<FailureRecord>) -> Self {
        Self { entries }
    }

    /// Loads the store; an unusable file yields an empty store
    pub fn load(path: &Path, backup_corrupt: bool) -> Self {
        Self::from_entries(load_or_default(path, "failure store", backup_corrupt))
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        write_json_atomic(path, &self.entries)
    }

    pub fn entries(&self) -> &[FailureRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.entries.iter().any(|e| e.url() == url)
    }

    /// Adds a failure, replacing an older entry for the same url in place
    ///
    /// Returns true when an older entry was replaced.
    pub fn merge(&mut self, failure: FailureRecord) -> bool {
        if !failure.url().is_empty() {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.url() == failure.url()) {
                *existing = failure;
                return true;
            }
        }
        self.entries.push(failure);
        false
    }

    /// Removes every entry and returns the original work items
    pub fn take_items(&mut self) -> Vec<WorkItem> {
        self.entries.drain(..).map(|e| e.item).collect()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        counts
    }
}
