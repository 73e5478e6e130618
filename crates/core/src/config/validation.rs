//! Configuration validation rules.
//!
//! Runs on `AppConfig` values after they have been loaded from environment,
//! files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `manifest_timeout_ms` is less than 100ms or exceeds `timeout_ms`
    /// - `user_agent` is empty
    /// - `install_concurrency` is outside 1..=64
    /// - `scope_url` or `manifest_path` does not resolve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.manifest_timeout_ms < 100 {
            return Err(invalid("manifest_timeout_ms", "must be at least 100ms"));
        }
        if self.manifest_timeout_ms > self.timeout_ms {
            return Err(invalid("manifest_timeout_ms", "must not exceed timeout_ms"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !(1..=64).contains(&self.install_concurrency) {
            return Err(invalid("install_concurrency", "must be between 1 and 64"));
        }

        self.manifest_url()?;

        Ok(())
    }
}
