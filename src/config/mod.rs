//! Responder configuration
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! Keys are overridden with `ARCHSTREAM__<KEY>`, for example
//! `ARCHSTREAM__CHUNK_SIZE=4MB` or `ARCHSTREAM__SCHEME=zim`.
//!
//! # Configuration File
//!
//! Loaded from `archstream.toml` unless `ARCHSTREAM_CONFIG` points
//! elsewhere. A missing file is not an error.

mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use crate::target::BlockedScriptPolicy;
pub use validation::ValidationError;

use crate::ranges::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

/// Policy constants of the streaming responder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResponderConfig {
    /// Upper bound on the bytes materialized per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    /// Custom URL scheme requests must use.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub blocked_scripts: BlockedScriptPolicy,
    /// Paths tried, in order, when a target names the archive root.
    #[serde(default = "default_main_page_candidates")]
    pub main_page_candidates: Vec<String>,
    /// Range requests against archives served over HTTP.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// HTTP Range access to remote archives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per range request before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry backoff in milliseconds, multiplied by the attempt number
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            scheme: default_scheme(),
            blocked_scripts: BlockedScriptPolicy::default(),
            main_page_candidates: default_main_page_candidates(),
            remote: RemoteConfig::default(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize(DEFAULT_CHUNK_SIZE)
}

fn default_scheme() -> String {
    "kiwix".to_string()
}

fn default_main_page_candidates() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

impl ResponderConfig {
    /// Load configuration from the default file location and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file plus environment overrides.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.as_u64()
    }

    /// Re-check invariants after settings were changed in code.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
