//! Configuration module for Catalog-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ingest.toml")).unwrap();
//! println!("Retry budget: {}", config.retry.max_attempts);
//! ```

mod parser;
mod types;
pub mod validation;

// Re-export types
pub use types::{
    BackoffConfig, Config, FetcherConfig, PipelineConfig, RetryConfig, StoreConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
