//! Pipeline module - fetch, retry and run orchestration
//!
//! This module contains the moving parts of an ingestion run:
//! - HTTP fetching of detail pages
//! - Extraction of structured fields from fetched content
//! - The retry/backoff controller wrapped around each item
//! - The run controller that drives a worker pool over the work queue

mod controller;
mod extractor;
mod fetcher;
mod retry;

pub use controller::{RunContext, RunController, RunReport};
pub use extractor::{first_integer, Extract, ExtractError, Extracted, HtmlExtractor};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher, RawContent};
pub use retry::{AttemptError, Backoff, Resolution, RetryController, RetryPolicy};

use crate::config::Config;
use crate::storage::Checkpoint;
use crate::IngestError;
use tokio_util::sync::CancellationToken;

/// Loads the checkpoint named by `config` and runs one pass over it
///
/// # Returns
///
/// * `Ok(RunReport)` - The run finished or was cancelled, and its outcomes were committed
/// * `Err(IngestError)` - The work queue could not be loaded, or the commit failed
pub async fn run_ingest(config: &Config, cancel: CancellationToken) -> Result<RunReport, IngestError> {
    let checkpoint = Checkpoint::load(config.store.paths(), config.store.backup_corrupt)?;
    let context = RunContext::from_config(config)?;

    let mut controller = RunController::new(context, checkpoint);
    controller.run(cancel).await
}
