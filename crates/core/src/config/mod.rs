//! Application configuration with layered loading.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Environment variables (SHELLCACHE_*)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::keys;

mod validation;

pub use validation::ConfigError;

/// Worker host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL the worker controls.
    ///
    /// Set via SHELLCACHE_SCOPE_URL environment variable.
    #[serde(default = "default_scope_url")]
    pub scope_url: String,

    /// Manifest location, resolved against the scope.
    ///
    /// Set via SHELLCACHE_MANIFEST_PATH environment variable.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Path to the SQLite cache database.
    ///
    /// Set via SHELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Live fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Manifest fetch timeout in milliseconds.
    #[serde(default = "default_manifest_timeout_ms")]
    pub manifest_timeout_ms: u64,

    /// Maximum response body size per fetch.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Concurrent asset fetches during install.
    #[serde(default = "default_install_concurrency")]
    pub install_concurrency: usize,

    /// Activate immediately after a successful install.
    ///
    /// Set via SHELLCACHE_SKIP_WAITING_ON_INSTALL environment variable.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,
}

fn default_scope_url() -> String {
    "http://localhost:8080/".into()
}

fn default_manifest_path() -> String {
    "./health-engine.json".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_manifest_timeout_ms() -> u64 {
    5_000
}

fn default_max_bytes() -> usize {
    5_242_880
}

fn default_install_concurrency() -> usize {
    6
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scope_url: default_scope_url(),
            manifest_path: default_manifest_path(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            manifest_timeout_ms: default_manifest_timeout_ms(),
            max_bytes: default_max_bytes(),
            install_concurrency: default_install_concurrency(),
            skip_waiting_on_install: true,
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    /// Canonical scope URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `scope_url` is not an http(s) URL.
    pub fn scope(&self) -> Result<Url, ConfigError> {
        keys::canonicalize_scope(&self.scope_url)
            .map_err(|e| ConfigError::Invalid { field: "scope_url".into(), reason: e.to_string() })
    }

    /// Manifest URL resolved against the scope.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the scope or manifest path does not
    /// resolve.
    pub fn manifest_url(&self) -> Result<Url, ConfigError> {
        let scope = self.scope()?;
        keys::resolve(&scope, &self.manifest_path)
            .map_err(|e| ConfigError::Invalid { field: "manifest_path".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
