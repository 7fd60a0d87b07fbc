//! Integration tests for the ingestion pipeline
//!
//! These tests use wiremock to create mock HTTP servers and drive full runs
//! end-to-end against on-disk stores.

use catalog_ingest::config::{
    load_config, BackoffConfig, Config, FetcherConfig, PipelineConfig, RetryConfig, StoreConfig,
    UserAgentConfig,
};
use catalog_ingest::storage::{Checkpoint, FailureKind, WorkItem, WorkQueue};
use catalog_ingest::{run_ingest, RunState};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn detail_page(description: &str, minutes: u32) -> String {
    format!(
        r#"<html><body>
        <div class="product-catalogue-training-calendar__row typ">
            <h4>Description</h4><p>{}</p>
        </div>
        <div class="product-catalogue-training-calendar__row typ">
            <h4>Languages</h4><p>English (USA),</p>
        </div>
        <div class="product-catalogue-training-calendar__row typ">
            <h4>Assessment length</h4><p>Approximate Completion Time in minutes = {}</p>
        </div>
        </body></html>"#,
        description, minutes
    )
}

/// Creates a test configuration with fast retries and stores under `dir`
fn create_test_config(dir: &Path, max_attempts: u32) -> Config {
    Config {
        pipeline: PipelineConfig {
            workers: 1,
            politeness_delay_ms: 0,
            ..PipelineConfig::default()
        },
        fetcher: FetcherConfig {
            timeout_secs: 1,
            connect_timeout_secs: 1,
        },
        retry: RetryConfig {
            max_attempts,
            backoff: BackoffConfig::Fixed { delay_ms: 0 },
            ..RetryConfig::default()
        },
        user_agent: UserAgentConfig {
            client_name: "TestIngest".to_string(),
            client_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        store: StoreConfig {
            work_queue: dir.join("final_copy.json"),
            results: dir.join("products.json"),
            failures: dir.join("failed.json"),
            backup_corrupt: true,
        },
    }
}

fn seed_queue(config: &Config, items: Vec<WorkItem>) {
    WorkQueue::from_items(items)
        .save(&config.store.work_queue)
        .expect("Failed to seed work queue");
}

fn reload(config: &Config) -> Checkpoint {
    Checkpoint::load(config.store.paths(), false).expect("Failed to reload checkpoint")
}

#[tokio::test]
async fn test_run_with_flaky_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3);

    Mock::given(method("GET"))
        .and(path("/view/a/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Test A", 30)))
        .expect(1)
        .mount(&server)
        .await;

    // b fails twice, then succeeds
    Mock::given(method("GET"))
        .and(path("/view/b/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view/b/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Test B", 12)))
        .expect(1)
        .mount(&server)
        .await;

    seed_queue(
        &config,
        vec![
            WorkItem::new(format!("{}/view/a/", server.uri())).with_metadata("remote_support", "Yes"),
            WorkItem::new(format!("{}/view/b/", server.uri())),
        ],
    );

    let report = run_ingest(&config, CancellationToken::new())
        .await
        .expect("Run failed");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.commit.records_inserted, 2);

    let checkpoint = reload(&config);
    assert!(checkpoint.queue().is_empty());
    assert!(checkpoint.failures().is_empty());

    let records = checkpoint.results().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].fields["description"], "Test A");
    assert_eq!(records[0].fields["language"], "English (USA)");
    assert_eq!(records[0].fields["duration"], "30");
    assert_eq!(records[0].provenance["remote_support"], "Yes");
    assert_eq!(records[1].fields["duration"], "12");
    assert_ne!(records[0].id, records[1].id);
}

#[tokio::test]
async fn test_run_parks_timed_out_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);

    Mock::given(method("GET"))
        .and(path("/view/c/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("Too slow", 5))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/view/c/", server.uri());
    seed_queue(&config, vec![WorkItem::new(url.clone())]);

    let report = run_ingest(&config, CancellationToken::new())
        .await
        .expect("Run failed");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);

    let checkpoint = reload(&config);
    assert!(checkpoint.queue().is_empty());
    assert!(checkpoint.results().is_empty());

    let failure = &checkpoint.failures().entries()[0];
    assert_eq!(failure.url(), url);
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(failure.reason.contains("2 attempt"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Stable", 20)))
        .mount(&server)
        .await;

    let items: Vec<WorkItem> = ["x", "y", "z"]
        .iter()
        .map(|name| WorkItem::new(format!("{}/view/{}/", server.uri(), name)))
        .collect();

    seed_queue(&config, items.clone());
    run_ingest(&config, CancellationToken::new()).await.unwrap();
    let first: Vec<String> = reload(&config)
        .results()
        .records()
        .iter()
        .map(|r| r.id.clone())
        .collect();

    // Nothing pending: a second run is a no-op
    let report = run_ingest(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.loaded, 0);
    assert_eq!(report.state, RunState::Completed);

    // Same items queued again: ids are reused
    seed_queue(&config, items);
    let report = run_ingest(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.commit.records_inserted, 0);
    assert_eq!(report.commit.records_unchanged, 3);

    let second: Vec<String> = reload(&config)
        .results()
        .records()
        .iter()
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_work_queue_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3);

    let result = run_ingest(&config, CancellationToken::new()).await;
    assert!(result.is_err());

    // Nothing was created
    assert!(!config.store.results.exists());
    assert!(!config.store.failures.exists());
}

#[tokio::test]
async fn test_corrupt_result_store_is_backed_up() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Fresh", 10)))
        .mount(&server)
        .await;

    std::fs::write(&config.store.results, "[{ not json").unwrap();
    seed_queue(&config, vec![WorkItem::new(format!("{}/view/a/", server.uri()))]);

    let report = run_ingest(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("products.json.corrupt-"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        std::fs::read_to_string(backups[0].path()).unwrap(),
        "[{ not json"
    );

    assert_eq!(reload(&config).results().len(), 1);
}

#[tokio::test]
async fn test_config_file_drives_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/view/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config_path = dir.path().join("ingest.toml");
    let store = dir.path().display();
    std::fs::write(
        &config_path,
        format!(
            r#"
[pipeline]
politeness-delay-ms = 0

[retry]
max-attempts = 3
retry-client-errors = false

[retry.backoff]
strategy = "fixed"
delay-ms = 0

[user-agent]
client-name = "TestIngest"
client-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "test@example.com"

[store]
work-queue = "{store}/queue.json"
results = "{store}/products.json"
failures = "{store}/failed.json"
"#
        ),
    )
    .unwrap();

    let config = load_config(&config_path).expect("Failed to load config");
    seed_queue(
        &config,
        vec![WorkItem::new(format!("{}/view/gone/", server.uri()))],
    );

    let report = run_ingest(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed, 1);

    let checkpoint = reload(&config);
    assert_eq!(checkpoint.failures().entries()[0].kind, FailureKind::HttpStatus);
    assert!(checkpoint.failures().entries()[0].reason.contains("not retryable"));
}
