use crate::pipeline::{Backoff, RetryPolicy};
use crate::storage::{DuplicatePolicy, StorePaths};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Catalog-Ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub store: StoreConfig,
}

/// Run controller behavior
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent workers (1 reproduces strictly sequential processing)
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Pause a worker takes after each item (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// Move parked failures back into the work queue before the run starts
    #[serde(rename = "requeue-failures", default)]
    pub requeue_failures: bool,

    /// How a record whose id already exists with different content is merged
    #[serde(rename = "duplicate-policy", default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            politeness_delay_ms: default_politeness_delay_ms(),
            requeue_failures: false,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Retry budget and classification policy
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per item, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry 4xx responses other than 429
    #[serde(rename = "retry-client-errors", default = "default_true")]
    pub retry_client_errors: bool,

    /// Retry pages the extractor could not parse
    #[serde(rename = "retry-parse-errors", default = "default_true")]
    pub retry_parse_errors: bool,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_client_errors: true,
            retry_parse_errors: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    /// Builds the runtime retry policy from this configuration
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff.to_backoff(),
            retry_client_errors: self.retry_client_errors,
            retry_parse_errors: self.retry_parse_errors,
        }
    }
}

/// Backoff strategy between attempts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// Same pause before every retry
    Fixed {
        #[serde(rename = "delay-ms")]
        delay_ms: u64,
    },

    /// `base * 2^attempt`, capped
    Exponential {
        #[serde(rename = "base-ms")]
        base_ms: u64,
        #[serde(rename = "cap-ms")]
        cap_ms: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 1_000,
            cap_ms: 30_000,
        }
    }
}

impl BackoffConfig {
    pub fn to_backoff(&self) -> Backoff {
        match *self {
            Self::Fixed { delay_ms } => Backoff::Fixed {
                delay: Duration::from_millis(delay_ms),
            },
            Self::Exponential { base_ms, cap_ms } => Backoff::Exponential {
                base: Duration::from_millis(base_ms),
                cap: Duration::from_millis(cap_ms),
            },
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the client
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the client
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for contact about the traffic
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent string: `Name/Version (+ContactURL; ContactEmail)`
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.client_name, self.client_version, self.contact_url, self.contact_email
        )
    }
}

/// Store file locations
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Pending work items (JSON array)
    #[serde(rename = "work-queue")]
    pub work_queue: PathBuf,

    /// Successfully extracted records (JSON array)
    pub results: PathBuf,

    /// Items parked after a terminal failure (JSON array)
    pub failures: PathBuf,

    /// Copy an unparseable store aside before it can be overwritten
    #[serde(rename = "backup-corrupt", default = "default_true")]
    pub backup_corrupt: bool,
}

impl StoreConfig {
    pub fn paths(&self) -> StorePaths {
        StorePaths {
            work_queue: self.work_queue.clone(),
            results: self.results.clone(),
            failures: self.failures.clone(),
        }
    }
}

fn default_workers() -> u32 {
    1
}

fn default_politeness_delay_ms() -> u64 {
    200
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}
