//! Run controller - one checkpointed pass over the work queue
//!
//! This module drives a single run:
//! - Optionally requeueing parked failures before the run starts
//! - Handing items to a bounded pool of worker tasks in queue order
//! - Collecting outcomes as the single writer of the run's delta
//! - Committing the delta exactly once, whether the run finished or was cancelled

use crate::config::{Config, PipelineConfig};
use crate::pipeline::{HtmlExtractor, HttpFetcher, Resolution, RetryController};
use crate::state::{RunDelta, RunState};
use crate::storage::{Checkpoint, CommitSummary, FailureKind, FailureRecord, Record, WorkItem};
use crate::IngestError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How often (in resolved items) progress is logged
const PROGRESS_INTERVAL: usize = 10;

type PendingItems = Arc<Mutex<VecDeque<(usize, WorkItem)>>>;

/// Everything a run needs besides the stores, built once at run start
#[derive(Clone)]
pub struct RunContext {
    retry: Arc<RetryController>,
    settings: PipelineConfig,
}

impl RunContext {
    pub fn new(retry: RetryController, settings: PipelineConfig) -> Self {
        Self {
            retry: Arc::new(retry),
            settings,
        }
    }

    /// Builds the HTTP fetcher, HTML extractor and retry policy from configuration
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        let fetcher = HttpFetcher::from_config(&config.user_agent, &config.fetcher)?;
        let retry = RetryController::new(
            Arc::new(fetcher),
            Arc::new(HtmlExtractor::new()),
            config.retry.to_policy(),
        );
        Ok(Self::new(retry, config.pipeline.clone()))
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    /// Items in the queue when workers started
    pub loaded: usize,
    /// Items at least one fetch attempt was made for
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items left pending by cancellation during a retry wait
    pub abandoned: usize,
    /// Items still in the persisted queue
    pub remaining: usize,
    /// Parked failures moved back into the queue before the run
    pub requeued: usize,
    pub commit: CommitSummary,
    pub elapsed: Duration,
}

/// What a worker sends back for each claimed item
#[derive(Debug)]
struct Outcome {
    index: usize,
    item: WorkItem,
    resolution: Resolution,
}

/// Owns the checkpoint for the length of one run
pub struct RunController {
    context: RunContext,
    checkpoint: Checkpoint,
    state: RunState,
}

impl RunController {
    pub fn new(context: RunContext, checkpoint: Checkpoint) -> Self {
        Self {
            context,
            checkpoint,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    fn transition(&mut self, next: RunState) -> Result<(), IngestError> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Run state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Runs one pass over the work queue
    ///
    /// Returns after the delta has been committed. Cancelling `cancel` stops
    /// workers from claiming new items; attempts already in flight finish and
    /// their outcomes are committed with the rest.
    pub async fn run(&mut self, cancel: CancellationToken) -> crate::Result<RunReport> {
        self.transition(RunState::Running)?;
        let started = Instant::now();

        let requeued = if self.context.settings.requeue_failures {
            self.checkpoint.requeue_failures()?
        } else {
            0
        };

        let loaded = self.checkpoint.queue().len();
        let mut delta = RunDelta::new();
        let mut pending = VecDeque::with_capacity(loaded);

        for (index, item) in self.checkpoint.queue().items().iter().enumerate() {
            if item.url.is_empty() {
                tracing::warn!("Queue position {} has no url; parking it", index);
                delta.record_failure(
                    index,
                    FailureRecord::new(item.clone(), FailureKind::InvalidItem, "work item has no url"),
                );
            } else {
                pending.push_back((index, item.clone()));
            }
        }

        let workers = (self.context.settings.workers.max(1) as usize).min(pending.len().max(1));
        tracing::info!(
            "Starting run: {} pending item(s), {} worker(s)",
            pending.len(),
            workers
        );

        let attempted = self.drive_workers(pending, workers, &cancel, &mut delta).await;

        let succeeded = delta.succeeded();
        let failed = delta.failed();
        let abandoned = delta.abandoned();
        let remaining = loaded - delta.resolved_count();

        let (records, failures, resolved) = delta.into_parts();
        let commit = self
            .checkpoint
            .commit(
                records,
                failures,
                &resolved,
                self.context.settings.duplicate_policy,
            )
            .map_err(|e| {
                tracing::error!("Checkpoint commit failed: {}", e);
                e
            })?;

        let final_state = if remaining == 0 {
            RunState::Completed
        } else {
            RunState::Interrupted
        };
        self.transition(final_state)?;

        let report = RunReport {
            state: final_state,
            loaded,
            attempted,
            succeeded,
            failed,
            abandoned,
            remaining: self.checkpoint.queue().len(),
            requeued,
            commit,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Run {}: {} succeeded, {} failed, {} abandoned, {} remaining",
            report.state,
            report.succeeded,
            report.failed,
            report.abandoned,
            report.remaining
        );

        Ok(report)
    }

    /// Spawns the worker pool and folds outcomes into `delta` until every
    /// worker has exited. Returns the number of items attempted.
    async fn drive_workers(
        &self,
        pending: VecDeque<(usize, WorkItem)>,
        workers: usize,
        cancel: &CancellationToken,
        delta: &mut RunDelta,
    ) -> usize {
        if pending.is_empty() {
            return 0;
        }

        let total = pending.len();
        let pending: PendingItems = Arc::new(Mutex::new(pending));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();

        for worker_id in 0..workers {
            pool.spawn(worker_loop(
                worker_id,
                Arc::clone(&pending),
                Arc::clone(&self.context.retry),
                self.context.settings.politeness_delay(),
                cancel.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut attempted = 0;

        while let Some(outcome) = rx.recv().await {
            attempted += 1;
            apply_outcome(delta, outcome);

            if attempted % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "Progress: {}/{} handled ({} succeeded, {} failed)",
                    attempted,
                    total,
                    delta.succeeded(),
                    delta.failed()
                );
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!("Worker panicked; its item stays pending: {}", e);
                } else {
                    tracing::warn!("Worker did not finish: {}", e);
                }
            }
        }

        attempted
    }
}

fn apply_outcome(delta: &mut RunDelta, outcome: Outcome) {
    let Outcome {
        index,
        item,
        resolution,
    } = outcome;

    match resolution {
        Resolution::Success {
            extracted,
            attempts,
        } => {
            tracing::debug!("Resolved {} after {} attempt(s)", item.url, attempts);
            let record = Record {
                id: String::new(),
                source_url: item.url,
                fields: extracted.into_fields(),
                provenance: item.metadata,
            };
            delta.record_success(index, record);
        }
        Resolution::Terminal { kind, reason, .. } => {
            tracing::warn!("Parking {} ({}): {}", item.url, kind, reason);
            delta.record_failure(index, FailureRecord::new(item, kind, reason));
        }
        Resolution::Abandoned { attempts } => {
            tracing::info!(
                "Left {} pending after {} attempt(s)",
                item.url,
                attempts
            );
            delta.record_abandoned();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    pending: PendingItems,
    retry: Arc<RetryController>,
    politeness_delay: Duration,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Outcome>,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Worker {} stopping: cancelled", worker_id);
            break;
        }

        let next = pending.lock().await.pop_front();
        let Some((index, item)) = next else {
            break;
        };

        let resolution = retry.resolve(&item, &cancel).await;
        if tx
            .send(Outcome {
                index,
                item,
                resolution,
            })
            .is_err()
        {
            break;
        }

        // No pause after the last item
        if politeness_delay.is_zero() || pending.lock().await.is_empty() {
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(politeness_delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Backoff, Fetch, FetchError, RawContent, RetryPolicy};
    use crate::storage::{StorePaths, WorkQueue};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Per-url scripted responses; an exhausted or missing script succeeds
    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: StdMutex<HashMap<String, VecDeque<Result<(), FetchError>>>>,
        calls: StdMutex<HashMap<String, u32>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl ScriptedFetcher {
        fn script(self, url: &str, responses: Vec<Result<(), FetchError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), responses.into());
            self
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            if let Some((target, token)) = &self.cancel_on {
                if target == url {
                    token.cancel();
                }
            }
            tokio::task::yield_now().await;

            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|script| script.pop_front());
            scripted.unwrap_or(Ok(()))?;

            Ok(RawContent {
                final_url: url.to_string(),
                status_code: 200,
                body: format!(
                    r#"<div class="product-catalogue-training-calendar__row">
                        <h4>Description</h4><p>About {}</p></div>
                       <div class="product-catalogue-training-calendar__row">
                        <h4>Assessment length</h4><p>minutes = 20</p></div>"#,
                    url
                ),
            })
        }
    }

    fn store_paths(dir: &TempDir) -> StorePaths {
        StorePaths {
            work_queue: dir.path().join("queue.json"),
            results: dir.path().join("products.json"),
            failures: dir.path().join("failed.json"),
        }
    }

    fn seed_queue(paths: &StorePaths, items: Vec<WorkItem>) {
        WorkQueue::from_items(items).save(&paths.work_queue).unwrap();
    }

    fn urls(urls: &[&str]) -> Vec<WorkItem> {
        urls.iter().map(|u| WorkItem::new(*u)).collect()
    }

    fn context(fetcher: Arc<ScriptedFetcher>, max_attempts: u32, workers: u32) -> RunContext {
        context_with_backoff(fetcher, max_attempts, workers, Duration::ZERO)
    }

    fn context_with_backoff(
        fetcher: Arc<ScriptedFetcher>,
        max_attempts: u32,
        workers: u32,
        delay: Duration,
    ) -> RunContext {
        let policy = RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..RetryPolicy::default()
        };
        let settings = PipelineConfig {
            workers,
            politeness_delay_ms: 0,
            ..PipelineConfig::default()
        };
        RunContext::new(
            RetryController::new(fetcher, Arc::new(HtmlExtractor::new()), policy),
            settings,
        )
    }

    async fn run_once(context: RunContext, paths: &StorePaths) -> (RunReport, RunController) {
        let checkpoint = Checkpoint::load(paths.clone(), true).unwrap();
        let mut controller = RunController::new(context, checkpoint);
        let report = controller.run(CancellationToken::new()).await.unwrap();
        (report, controller)
    }

    #[tokio::test]
    async fn test_flaky_item_recovers_within_budget() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["a", "b"]));

        let fetcher = Arc::new(ScriptedFetcher::default().script(
            "b",
            vec![Err(FetchError::HttpStatus(503)), Err(FetchError::Timeout)],
        ));
        let (report, controller) = run_once(context(fetcher.clone(), 3, 1), &paths).await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 0);
        assert_eq!(fetcher.calls("a"), 1);
        assert_eq!(fetcher.calls("b"), 3);

        let checkpoint = controller.checkpoint();
        assert_eq!(checkpoint.results().len(), 2);
        assert!(checkpoint.failures().is_empty());
        assert!(checkpoint.queue().is_empty());

        let b = checkpoint
            .results()
            .records()
            .iter()
            .find(|r| r.source_url == "b")
            .unwrap();
        assert_eq!(b.fields["description"], "About b");
        assert_eq!(b.fields["duration"], "20");
    }

    #[tokio::test]
    async fn test_exhausted_budget_parks_item() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["c"]));

        let fetcher = Arc::new(ScriptedFetcher::default().script(
            "c",
            vec![Err(FetchError::Timeout), Err(FetchError::Timeout), Err(FetchError::Timeout)],
        ));
        let (report, _) = run_once(context(fetcher.clone(), 2, 1), &paths).await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.failed, 1);
        assert_eq!(fetcher.calls("c"), 2);

        let reloaded = Checkpoint::load(paths, true).unwrap();
        assert!(reloaded.queue().is_empty());
        assert!(reloaded.results().is_empty());
        let failure = &reloaded.failures().entries()[0];
        assert_eq!(failure.url(), "c");
        assert_eq!(failure.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_cancellation_commits_resolved_items_only() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["a", "b", "c", "d"]));

        let token = CancellationToken::new();
        let fetcher = Arc::new(ScriptedFetcher {
            cancel_on: Some(("b".to_string(), token.clone())),
            ..ScriptedFetcher::default()
        }
        .script("b", vec![Err(FetchError::HttpStatus(502))]));

        let context = context_with_backoff(fetcher.clone(), 3, 1, Duration::from_secs(60));
        let checkpoint = Checkpoint::load(paths.clone(), true).unwrap();
        let mut controller = RunController::new(context, checkpoint);
        let report = controller.run(token).await.unwrap();

        assert_eq!(report.state, RunState::Interrupted);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.remaining, 3);
        assert_eq!(fetcher.calls("c"), 0);

        let reloaded = Checkpoint::load(paths, true).unwrap();
        let pending: Vec<&str> = reloaded.queue().items().iter().map(|i| i.url.as_str()).collect();
        assert_eq!(pending, vec!["b", "c", "d"]);
        assert_eq!(reloaded.results().len(), 1);
        assert!(reloaded.failures().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_reuses_ids() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        let items = vec![
            WorkItem::new("a").with_metadata("test_type", "Knowledge"),
            WorkItem::new("b"),
        ];
        seed_queue(&paths, items.clone());

        let fetcher = Arc::new(ScriptedFetcher::default());
        let (_, first) = run_once(context(fetcher.clone(), 3, 1), &paths).await;
        let first_ids: Vec<String> = first
            .checkpoint()
            .results()
            .records()
            .iter()
            .map(|r| r.id.clone())
            .collect();

        seed_queue(&paths, items);
        let (report, second) = run_once(context(fetcher, 3, 1), &paths).await;

        assert_eq!(report.commit.records_inserted, 0);
        assert_eq!(report.commit.records_unchanged, 2);

        let results = second.checkpoint().results();
        assert_eq!(results.len(), 2);
        let second_ids: Vec<String> = results.records().iter().map(|r| r.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(
            results.records()[0].provenance["test_type"],
            "Knowledge"
        );
    }

    #[tokio::test]
    async fn test_queue_is_conserved() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        let mut items = urls(&["a", "b", "c", "d"]);
        items.push(WorkItem::new("").with_metadata("name", "no link"));
        seed_queue(&paths, items);

        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .script("b", vec![Err(FetchError::HttpStatus(404))])
                .script("d", vec![Err(FetchError::Connection("reset".to_string()))]),
        );
        let (report, controller) = run_once(context(fetcher, 1, 2), &paths).await;

        assert_eq!(report.loaded, 5);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded + report.failed, 5);
        assert_eq!(report.loaded, report.remaining + report.succeeded + report.failed);

        let failures = controller.checkpoint().failures();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures.counts_by_kind()[&FailureKind::InvalidItem], 1);
    }

    #[tokio::test]
    async fn test_workers_never_share_an_item() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        let names: Vec<String> = (0..20).map(|i| format!("item-{}", i)).collect();
        seed_queue(&paths, names.iter().map(WorkItem::new).collect());

        let fetcher = Arc::new(ScriptedFetcher::default());
        let (report, controller) = run_once(context(fetcher.clone(), 3, 4), &paths).await;

        assert_eq!(report.succeeded, 20);
        for name in &names {
            assert_eq!(fetcher.calls(name), 1, "{}", name);
        }
        assert_eq!(controller.checkpoint().results().len(), 20);
        assert!(controller.checkpoint().queue().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_runs_parked_failures_again() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["a"]));

        let fetcher = Arc::new(
            ScriptedFetcher::default().script("a", vec![Err(FetchError::HttpStatus(500))]),
        );
        let (first, _) = run_once(context(fetcher.clone(), 1, 1), &paths).await;
        assert_eq!(first.failed, 1);

        let mut ctx = context(fetcher, 1, 1);
        ctx.settings.requeue_failures = true;
        let (second, controller) = run_once(ctx, &paths).await;

        assert_eq!(second.requeued, 1);
        assert_eq!(second.succeeded, 1);
        assert!(controller.checkpoint().failures().is_empty());
        assert_eq!(controller.checkpoint().results().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["a"]));

        let (_, mut controller) =
            run_once(context(Arc::new(ScriptedFetcher::default()), 3, 1), &paths).await;
        assert_eq!(controller.state(), RunState::Completed);

        let result = controller.run(CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(IngestError::InvalidTransition {
                from: RunState::Completed,
                to: RunState::Running
            })
        ));
    }

    #[tokio::test]
    async fn test_no_politeness_pause_after_last_item() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, urls(&["a"]));

        let mut ctx = context(Arc::new(ScriptedFetcher::default()), 3, 1);
        ctx.settings.politeness_delay_ms = 60_000;

        let checkpoint = Checkpoint::load(paths, true).unwrap();
        let mut controller = RunController::new(ctx, checkpoint);
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            controller.run(CancellationToken::new()),
        )
        .await
        .expect("run waited out the politeness delay after its last item")
        .unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_completes() {
        let dir = TempDir::new().unwrap();
        let paths = store_paths(&dir);
        seed_queue(&paths, vec![]);

        let (report, _) =
            run_once(context(Arc::new(ScriptedFetcher::default()), 3, 1), &paths).await;
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.loaded, 0);
        assert_eq!(report.attempted, 0);
    }
}
