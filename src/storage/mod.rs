//! Storage module for persisting ingestion progress
//!
//! This module handles all on-disk state for the pipeline, including:
//! - The pending work queue
//! - The result store of extracted records
//! - The failure store of items parked after a terminal failure
//! - Atomic checkpoint commits across all three

mod checkpoint;
mod error;
pub mod json_file;
mod failures;
mod queue;
mod results;

pub use checkpoint::{Checkpoint, CommitSummary, StorePaths};
pub use error::{StorageError, StorageResult};
pub use failures::FailureStore;
pub use queue::WorkQueue;
pub use results::{DuplicatePolicy, MergeOutcome, ResultStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One unit of pending ingestion work
///
/// Serialized as a flat object: `url` plus every other key as metadata, which
/// is the shape the catalogue listing produces.
/// A null or missing `url` reads as empty and the item is later parked as
/// `invalid-item`. Non-string metadata values are kept as their JSON text;
/// null metadata values are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub url: String,

    #[serde(flatten, deserialize_with = "metadata_as_strings")]
    pub metadata: BTreeMap<String, String>,
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn metadata_as_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A successfully extracted catalogue record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier used by downstream indexes; never regenerated
    #[serde(default)]
    pub id: String,

    #[serde(rename = "url")]
    pub source_url: String,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Metadata copied from the originating work item
    #[serde(default)]
    pub provenance: BTreeMap<String, String>,
}

impl Record {
    /// True when everything except the id matches
    pub fn same_content(&self, other: &Record) -> bool {
        self.source_url == other.source_url
            && self.fields == other.fields
            && self.provenance == other.provenance
    }
}

/// Classification of the error that parked an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Timeout,
    HttpStatus,
    Connection,
    Extract,
    InvalidItem,
    /// Entries written before failure kinds were recorded
    #[default]
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::HttpStatus => "http-status",
            Self::Connection => "connection",
            Self::Extract => "extract",
            Self::InvalidItem => "invalid-item",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work item that could not be resolved, parked for manual triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(flatten)]
    pub item: WorkItem,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub kind: FailureKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn new(item: WorkItem, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            item,
            reason: reason.into(),
            kind,
            failed_at: Some(Utc::now()),
        }
    }

    pub fn url(&self) -> &str {
        &self.item.url
    }
}
