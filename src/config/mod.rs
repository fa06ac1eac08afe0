//! Configuration module for Kiroku
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation, plus pure-environment
//! loading of store credentials for embedding contexts where no config file
//! exists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Part-size threshold: a part is handed off once the accumulated buffer
/// exceeds this many bytes. Object stores require all parts except the last
/// to be at least 5 MiB.
pub const DEFAULT_PART_SIZE_THRESHOLD: usize = 5 * 1024 * 1024;

/// Total attempts per part upload, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                if let Some(default) = cap.get(2) {
                    default.as_str().to_string()
                } else {
                    // No env var and no default. Keep the original placeholder.
                    full_match.as_str().to_string()
                }
            }
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.upload.validate()
    }
}

/// Object store configuration
///
/// Region, keys, and bucket identify the destination; `endpoint` overrides
/// the store's default endpoint (e.g. for MinIO or localstack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl StoreConfig {
    /// Load store configuration from environment variables
    ///
    /// Looks for:
    /// - `KIROKU_BUCKET`
    /// - `AWS_REGION`
    /// - `AWS_ACCESS_KEY_ID`
    /// - `AWS_SECRET_ACCESS_KEY`
    /// - `AWS_SESSION_TOKEN` (optional)
    /// - `KIROKU_ENDPOINT` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket =
            std::env::var("KIROKU_BUCKET").map_err(|_| ConfigError::MissingEnv("KIROKU_BUCKET"))?;
        let region =
            std::env::var("AWS_REGION").map_err(|_| ConfigError::MissingEnv("AWS_REGION"))?;
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| ConfigError::MissingEnv("AWS_ACCESS_KEY_ID"))?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| ConfigError::MissingEnv("AWS_SECRET_ACCESS_KEY"))?;

        let config = Self {
            bucket,
            region,
            endpoint: std::env::var("KIROKU_ENDPOINT").ok(),
            access_key,
            secret_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError("bucket must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::ValidationError("region must not be empty".into()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "access_key and secret_key must not be empty".into(),
            ));
        }
        if let Some(ref endpoint) = self.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(
                    "Invalid endpoint: must start with http:// or https://".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Upload pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Buffer size above which the accumulated bytes become one part
    #[serde(default = "default_part_size_threshold")]
    pub part_size_threshold: usize,

    /// Total attempts per part upload, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Content type recorded on the created object
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_part_size_threshold() -> usize {
    DEFAULT_PART_SIZE_THRESHOLD
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_content_type() -> String {
    "video/webm".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size_threshold: default_part_size_threshold(),
            max_attempts: default_max_attempts(),
            content_type: default_content_type(),
        }
    }
}

impl UploadConfig {
    /// Validate the upload configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "part_size_threshold must be greater than zero".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
