//! The pending work queue

use crate::storage::json_file::{read_json, write_json_atomic};
use crate::storage::{StorageError, StorageResult, WorkItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Ordered list of work items not yet resolved
///
/// Persisted as a JSON array. Items are unique by url; order is the order
/// the run controller hands them out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
}

impl WorkQueue {
    /// Builds a queue, collapsing duplicate urls to their first occurrence
    pub fn from_items(items: Vec<WorkItem>) -> Self {
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        let mut unique = Vec::with_capacity(items.len());

        for item in items {
            if !item.url.is_empty() && !seen.insert(item.url.clone()) {
                duplicates += 1;
                continue;
            }
            unique.push(item);
        }

        if duplicates > 0 {
            tracing::warn!(
                "Work queue contained {} duplicate url(s); keeping first occurrences",
                duplicates
            );
        }

        Self { items: unique }
    }

    /// Loads the queue from disk
    ///
    /// Unlike the output stores, the queue is the run's input: a missing or
    /// unparseable file is a setup failure.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let items: Vec<WorkItem> =
            read_json(path)?.ok_or_else(|| StorageError::MissingWorkQueue(path.to_path_buf()))?;
        Ok(Self::from_items(items))
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        write_json_atomic(path, &self.items)
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.items.iter().any(|item| item.url == url)
    }

    /// Drops every item whose position is in `resolved`
    ///
    /// Positions refer to the queue as it was when the run started.
    /// Returns the number of items removed.
    pub fn remove_resolved(&mut self, resolved: &BTreeSet<usize>) -> usize {
        let before = self.items.len();
        let mut index = 0;
        self.items.retain(|_| {
            let keep = !resolved.contains(&index);
            index += 1;
            keep
        });
        before - self.items.len()
    }

    /// Appends items whose url is not already queued
    ///
    /// Items without a url are always appended, as in [`WorkQueue::from_items`].
    /// Returns the number of items appended.
    pub fn append_missing(&mut self, items: impl IntoIterator<Item = WorkItem>) -> usize {
        let mut queued: HashSet<String> = self.items.iter().map(|i| i.url.clone()).collect();
        let mut appended = 0;
        for item in items {
            if item.url.is_empty() || queued.insert(item.url.clone()) {
                self.items.push(item);
                appended += 1;
            }
        }
        appended
    }
}
