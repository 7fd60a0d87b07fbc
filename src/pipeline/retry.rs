//! Retry/backoff controller
//!
//! Drives fetch + extract for one work item until it succeeds, the retry
//! budget runs out, the failure is classified as not worth retrying, or
//! cancellation arrives while waiting to retry.

use crate::pipeline::{Extract, ExtractError, Extracted, Fetch, FetchError};
use crate::storage::{FailureKind, WorkItem};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same pause before every retry
    Fixed { delay: Duration },

    /// `base * 2^attempt`, never longer than `cap`
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// One-second fixed pause
    pub fn fixed_preset() -> Self {
        Self::Fixed {
            delay: Duration::from_secs(1),
        }
    }

    /// 1s, 2s, 4s, ... capped at 30s
    pub fn exponential_preset() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, cap } => 2u32
                .checked_pow(attempt)
                .and_then(|factor| base.checked_mul(factor))
                .map_or(cap, |delay| delay.min(cap)),
        }
    }
}

/// Retry budget and failure classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per item, including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Retry HTTP statuses that are not transient (404, 403, ...)
    pub retry_client_errors: bool,
    /// Retry pages the extractor rejected
    pub retry_parse_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential_preset(),
            retry_client_errors: true,
            retry_parse_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &AttemptError) -> bool {
        match error {
            AttemptError::Fetch(e) if e.is_transient() => true,
            AttemptError::Fetch(_) => self.retry_client_errors,
            AttemptError::Extract(_) => self.retry_parse_errors,
        }
    }
}

/// Why one attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

impl AttemptError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Fetch(e) => e.failure_kind(),
            Self::Extract(_) => FailureKind::Extract,
        }
    }
}

/// Final answer for one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Success {
        extracted: Extracted,
        attempts: u32,
    },
    Terminal {
        kind: FailureKind,
        reason: String,
        attempts: u32,
    },
    /// Cancelled while waiting to retry; the item stays pending
    Abandoned { attempts: u32 },
}

/// Wraps a fetcher and extractor with the retry policy
pub struct RetryController {
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extract>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(fetcher: Arc<dyn Fetch>, extractor: Arc<dyn Extract>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            extractor,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolves one work item
    ///
    /// An attempt that has started always runs to completion; cancellation
    /// is only observed during the pause between attempts.
    pub async fn resolve(&self, item: &WorkItem, cancel: &CancellationToken) -> Resolution {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            tracing::debug!("Attempt {}/{} for {}", attempts, max_attempts, item.url);

            let error = match self.attempt(&item.url).await {
                Ok(extracted) => {
                    return Resolution::Success {
                        extracted,
                        attempts,
                    }
                }
                Err(e) => e,
            };

            if !self.policy.is_retryable(&error) {
                return Resolution::Terminal {
                    kind: error.failure_kind(),
                    reason: format!("not retryable: {}", error),
                    attempts,
                };
            }

            if attempts >= max_attempts {
                return Resolution::Terminal {
                    kind: error.failure_kind(),
                    reason: format!("gave up after {} attempt(s): {}", attempts, error),
                    attempts,
                };
            }

            let delay = self.policy.backoff.delay_for(attempts - 1);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempts,
                max_attempts,
                item.url,
                error,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Cancelled while waiting to retry {}", item.url);
                    return Resolution::Abandoned { attempts };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Extracted, AttemptError> {
        let raw = self.fetcher.fetch(url).await?;
        Ok(self.extractor.extract(&raw)?)
    }
}
