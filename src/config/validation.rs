use crate::config::types::{
    BackoffConfig, Config, FetcherConfig, PipelineConfig, RetryConfig, StoreConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound for any single backoff pause (10 minutes)
const MAX_BACKOFF_MS: u64 = 10 * 60 * 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_store_config(&config.store)?;
    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    match config.backoff {
        BackoffConfig::Fixed { delay_ms } => {
            if delay_ms > MAX_BACKOFF_MS {
                return Err(ConfigError::Validation(format!(
                    "fixed backoff delay must be <= {}ms, got {}ms",
                    MAX_BACKOFF_MS, delay_ms
                )));
            }
        }
        BackoffConfig::Exponential { base_ms, cap_ms } => {
            if cap_ms > MAX_BACKOFF_MS {
                return Err(ConfigError::Validation(format!(
                    "exponential backoff cap must be <= {}ms, got {}ms",
                    MAX_BACKOFF_MS, cap_ms
                )));
            }
            if base_ms > cap_ms {
                return Err(ConfigError::Validation(format!(
                    "exponential backoff base ({}ms) cannot exceed cap ({}ms)",
                    base_ms, cap_ms
                )));
            }
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Client name: non-empty, alphanumeric + hyphens only
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client_name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    if config.client_version.is_empty() {
        return Err(ConfigError::Validation(
            "client_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    let paths = [
        ("work_queue", &config.work_queue),
        ("results", &config.results),
        ("failures", &config.failures),
    ];

    for (name, path) in &paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "store path '{}' cannot be empty",
                name
            )));
        }
    }

    for (i, (name_a, path_a)) in paths.iter().enumerate() {
        for (name_b, path_b) in &paths[i + 1..] {
            if path_a == path_b {
                return Err(ConfigError::Validation(format!(
                    "store paths '{}' and '{}' must differ, both are {}",
                    name_a,
                    name_b,
                    path_a.display()
                )));
            }
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store(queue: &str, results: &str, failures: &str) -> StoreConfig {
        StoreConfig {
            work_queue: PathBuf::from(queue),
            results: PathBuf::from(results),
            failures: PathBuf::from(failures),
            backup_corrupt: true,
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_store_paths() {
        assert!(validate_store_config(&store("q.json", "r.json", "f.json")).is_ok());
        assert!(validate_store_config(&store("", "r.json", "f.json")).is_err());
        assert!(validate_store_config(&store("q.json", "q.json", "f.json")).is_err());
        assert!(validate_store_config(&store("q.json", "r.json", "r.json")).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut retry = RetryConfig::default();
        assert!(validate_retry_config(&retry).is_ok());

        retry.backoff = BackoffConfig::Exponential {
            base_ms: 5_000,
            cap_ms: 1_000,
        };
        assert!(validate_retry_config(&retry).is_err());

        retry.backoff = BackoffConfig::Fixed {
            delay_ms: MAX_BACKOFF_MS + 1,
        };
        assert!(validate_retry_config(&retry).is_err());

        retry.backoff = BackoffConfig::Fixed { delay_ms: 0 };
        assert!(validate_retry_config(&retry).is_ok());
    }

    #[test]
    fn test_validate_worker_and_attempt_ranges() {
        let mut pipeline = PipelineConfig::default();
        pipeline.workers = 0;
        assert!(validate_pipeline_config(&pipeline).is_err());
        pipeline.workers = 33;
        assert!(validate_pipeline_config(&pipeline).is_err());
        pipeline.workers = 8;
        assert!(validate_pipeline_config(&pipeline).is_ok());

        let mut retry = RetryConfig::default();
        retry.max_attempts = 21;
        assert!(validate_retry_config(&retry).is_err());
    }

    #[test]
    fn test_validate_client_name() {
        let mut ua = UserAgentConfig {
            client_name: "Catalog-Ingest".to_string(),
            client_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "ops@example.com".to_string(),
        };
        assert!(validate_user_agent_config(&ua).is_ok());

        ua.client_name = "bad name".to_string();
        assert!(validate_user_agent_config(&ua).is_err());

        ua.client_name = "Good".to_string();
        ua.contact_url = "not a url".to_string();
        assert!(matches!(
            validate_user_agent_config(&ua),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
