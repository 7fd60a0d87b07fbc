//! HTTP fetcher implementation
//!
//! This module handles the single network request made per attempt:
//! - Building the HTTP client with a stable user agent and timeouts
//! - One GET per call, no retries (those live in the retry controller)
//! - Classifying failures into timeout, HTTP status and connection errors

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::storage::FailureKind;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Body and metadata of a successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Response body
    pub body: String,
}

/// Classified failure of a single fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("connection error: {0}")]
    Connection(String),
}

impl FetchError {
    /// Returns true for failures that commonly clear up on their own
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | Connection error | yes |
    /// | HTTP 429, 500, 502, 503, 504 | yes |
    /// | Any other status | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::HttpStatus(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout => FailureKind::Timeout,
            Self::HttpStatus(_) => FailureKind::HttpStatus,
            Self::Connection(_) => FailureKind::Connection,
        }
    }
}

/// A single-attempt content fetcher
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// The user agent has the form `Name/Version (+ContactURL; ContactEmail)` so
/// the remote side can identify and rate-limit the traffic consistently.
///
/// # Example
///
/// ```no_run
/// use catalog_ingest::config::{FetcherConfig, UserAgentConfig};
/// use catalog_ingest::pipeline::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     client_name: "CatalogIngest".to_string(),
///     client_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.user_agent())
        .timeout(Duration::from_secs(fetcher.timeout_secs))
        .connect_timeout(Duration::from_secs(fetcher.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetch`] implementation
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(
        user_agent: &UserAgentConfig,
        fetcher: &FetcherConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent, fetcher)?))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify_error)?;

        Ok(RawContent {
            final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}

fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Connection(error.to_string())
    }
}
