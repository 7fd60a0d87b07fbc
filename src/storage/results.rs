//! The result store of extracted records

use crate::storage::json_file::{load_or_default, write_json_atomic};
use crate::storage::{Record, StorageResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Resolution rule for a record whose id is already stored with different content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The incoming record replaces the stored one
    #[default]
    LastWriteWins,
    /// The stored record is kept and the conflict is logged
    KeepExisting,
}

/// What `ResultStore::merge` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New id, appended
    Inserted,
    /// Existing id, content replaced
    Replaced,
    /// Existing id, identical content
    Unchanged,
    /// Existing id, different content, stored record kept
    KeptExisting,
}

/// Records keyed by stable id, with a url index for id reuse
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: Vec<Record>,
    by_id: HashMap<String, usize>,
    by_url: HashMap<String, usize>,
}

impl ResultStore {
    /// Builds a store from loaded records
    ///
    /// Records without an id get one minted here. Returns the store and the
    /// number of ids minted, so callers know the file needs rewriting.
    pub fn from_records(records: Vec<Record>) -> (Self, usize) {
        let mut store = Self::default();
        let mut minted = 0;

        for mut record in records {
            if record.id.is_empty() {
                record.id = Uuid::new_v4().to_string();
                tracing::info!("Assigned new id {} to {}", record.id, record.source_url);
                minted += 1;
            }

            let index = store.records.len();
            if store.by_id.insert(record.id.clone(), index).is_some() {
                tracing::warn!(
                    "Result store holds id {} more than once; lookups use the last entry",
                    record.id
                );
            }
            store
                .by_url
                .entry(record.source_url.clone())
                .or_insert(index);
            store.records.push(record);
        }

        (store, minted)
    }

    /// Loads the store; an unusable file yields an empty store
    pub fn load(path: &Path, backup_corrupt: bool) -> (Self, usize) {
        let records: Vec<Record> = load_or_default(path, "result store", backup_corrupt);
        Self::from_records(records)
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        write_json_atomic(path, &self.records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn id_for_url(&self, url: &str) -> Option<&str> {
        self.by_url.get(url).map(|&i| self.records[i].id.as_str())
    }

    /// Merges one record into the store
    ///
    /// The id is resolved by url first: a url that already has a record keeps
    /// that record's id whatever the incoming id says. A record with no id and
    /// no prior url gets a fresh one.
    pub fn merge(&mut self, mut record: Record, policy: DuplicatePolicy) -> MergeOutcome {
        if let Some(existing) = self.id_for_url(&record.source_url) {
            if record.id != existing {
                record.id = existing.to_string();
            }
        } else if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let Some(&index) = self.by_id.get(&record.id) else {
            let index = self.records.len();
            self.by_id.insert(record.id.clone(), index);
            self.by_url.insert(record.source_url.clone(), index);
            tracing::debug!("Stored record {} for {}", record.id, record.source_url);
            self.records.push(record);
            return MergeOutcome::Inserted;
        };

        if self.records[index].same_content(&record) {
            return MergeOutcome::Unchanged;
        }

        match policy {
            DuplicatePolicy::LastWriteWins => {
                let previous_url = self.records[index].source_url.clone();
                if previous_url != record.source_url {
                    if self.by_url.get(&previous_url) == Some(&index) {
                        self.by_url.remove(&previous_url);
                    }
                    self.by_url.insert(record.source_url.clone(), index);
                }
                tracing::debug!("Replaced record {} for {}", record.id, record.source_url);
                self.records[index] = record;
                MergeOutcome::Replaced
            }
            DuplicatePolicy::KeepExisting => {
                tracing::warn!(
                    "Record {} for {} differs from the stored one; keeping the stored record",
                    record.id,
                    record.source_url
                );
                MergeOutcome::KeptExisting
            }
        }
    }
}
