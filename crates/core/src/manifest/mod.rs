//! Cache manifest model.
//!
//! The manifest is the JSON document that tells the worker what to precache,
//! which strategy to apply to assets, and which responses may be cached at
//! runtime. See [`loader`] for fetching it with fallback.

pub mod loader;

use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

pub use loader::{LoadedManifest, ManifestLoader, ManifestSource};

/// Version used by the built-in fallback manifest.
pub const FALLBACK_VERSION: &str = "shellcache-fallback";

/// Default caching algorithm for asset requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

/// A feature module of the app. Disabled modules are never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub assets: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Regex rule matched against the absolute request URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRule {
    pub pattern: String,
}

/// The cache manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Changing this value starts a new cache generation.
    pub cache_version: String,

    /// Optional generation-name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,

    #[serde(default)]
    pub strategy: Strategy,

    /// Assets precached unconditionally.
    #[serde(default)]
    pub core: Vec<String>,

    /// Path prefixes cached opportunistically at runtime.
    #[serde(default)]
    pub dynamic_prefixes: Vec<String>,

    #[serde(default)]
    pub runtime_cache: Vec<RuntimeRule>,

    #[serde(default)]
    pub modules: BTreeMap<String, ModuleDescriptor>,

    /// Client-side route -> target asset.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    #[serde(default)]
    pub offline_fallback_path: Option<String>,
}

impl Manifest {
    /// Parse and validate manifest JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidManifest(format!("malformed JSON: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Minimal app-shell manifest used whenever the remote one is unusable.
    pub fn fallback(manifest_url: &str) -> Self {
        Self {
            cache_version: FALLBACK_VERSION.to_string(),
            cache_name: None,
            strategy: Strategy::CacheFirst,
            core: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./style.css".to_string(),
                "./script.js".to_string(),
                manifest_url.to_string(),
            ],
            dynamic_prefixes: Vec::new(),
            runtime_cache: Vec::new(),
            modules: BTreeMap::new(),
            routes: BTreeMap::new(),
            offline_fallback_path: None,
        }
    }

    /// Name of the cache generation this manifest populates.
    pub fn generation_name(&self) -> String {
        match self.cache_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(prefix) => format!("{prefix}-{}", self.cache_version.trim()),
            None => self.cache_version.trim().to_string(),
        }
    }

    /// Modules that take part in caching.
    pub fn enabled_modules(&self) -> impl Iterator<Item = (&String, &ModuleDescriptor)> {
        self.modules.iter().filter(|(_, m)| m.enabled)
    }

    /// Compile the runtime-cache patterns.
    pub fn runtime_patterns(&self) -> Result<Vec<Regex>, Error> {
        self.runtime_cache
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map_err(|e| Error::InvalidManifest(format!("runtimeCache pattern {:?}: {e}", rule.pattern)))
            })
            .collect()
    }

    /// Check required fields and patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidManifest` if `cacheVersion` is blank or a
    /// runtime-cache pattern does not compile.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cache_version.trim().is_empty() {
            return Err(Error::InvalidManifest("cacheVersion must not be empty".into()));
        }

        self.runtime_patterns()?;

        Ok(())
    }
}
