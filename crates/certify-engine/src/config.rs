//! Configuration types for the certificate assignment engine.
//!
//! Configuration is read from `certify.json`. Missing keys fall back to
//! defaults and unknown keys are ignored.

use std::path::Path;
use std::time::Duration;

use certify_store::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{CertifyError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "certify.json";

fn default_snapshot_file() -> String {
    ".certify/state.json".to_string()
}

fn default_report_dir() -> String {
    ".".to_string()
}

fn default_preview_base_url() -> String {
    "http://127.0.0.1:3000/api/certificates".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5000
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path of the JSON snapshot holding templates, assignments and courses.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    /// Directory coverage reports are written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: String,

    /// Base URL preview and asset links are built from.
    #[serde(default = "default_preview_base_url")]
    pub preview_base_url: String,

    /// Promote the lowest remaining template when the default is deleted.
    #[serde(default)]
    pub promote_default_on_delete: bool,

    /// Retry behavior for transient store failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            report_dir: default_report_dir(),
            preview_base_url: default_preview_base_url(),
            promote_default_on_delete: false,
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CertifyError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `certify.json` from a specific directory, or defaults if absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `CertifyError::ConfigParseError` for unreadable or invalid JSON
    /// and `CertifyError::ConfigValidationError` for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CertifyError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CertifyError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_file.trim().is_empty() {
            return Err(CertifyError::config_validation(
                "snapshotFile must not be empty",
                "Provide a snapshot file path in your certify.json",
            ));
        }

        if self.report_dir.trim().is_empty() {
            return Err(CertifyError::config_validation(
                "reportDir must not be empty",
                "Provide a report directory in your certify.json (use '.' for current directory)",
            ));
        }

        if !(self.preview_base_url.starts_with("http://")
            || self.preview_base_url.starts_with("https://"))
        {
            return Err(CertifyError::config_validation(
                format!(
                    "previewBaseUrl must be an http(s) URL, got '{}'",
                    self.preview_base_url
                ),
                "Set previewBaseUrl to the public address of the certificate API",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(CertifyError::config_validation(
                "retry.maxAttempts must be greater than 0",
                "Set retry.maxAttempts to at least 1 in your certify.json",
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CertifyError::config_validation(
                "retry.initialBackoffMs must not exceed retry.maxBackoffMs",
                "Lower retry.initialBackoffMs or raise retry.maxBackoffMs",
            ));
        }

        if self.server.port == 0 {
            return Err(CertifyError::config_validation(
                "server.port must be greater than 0",
                "Set server.port to a free TCP port in your certify.json",
            ));
        }

        Ok(())
    }

    /// Preview base URL without a trailing slash.
    #[must_use]
    pub fn preview_base(&self) -> &str {
        self.preview_base_url.trim_end_matches('/')
    }
}

/// Retry settings for transient Template Store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per idempotent call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any retry delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Builds the store retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
