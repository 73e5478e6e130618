//! Manifest loading with fallback.
//!
//! The loader never fails: any problem fetching or validating the remote
//! manifest is logged and replaced by [`Manifest::fallback`], so install can
//! always proceed.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::Manifest;
use crate::Error;
use crate::network::{CacheMode, Network, Request};

/// Where a loaded manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    Remote,
    Fallback,
}

/// Result of [`ManifestLoader::load`].
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub source: ManifestSource,
}

/// Fetches the manifest from a fixed URL.
#[derive(Clone)]
pub struct ManifestLoader {
    network: Arc<dyn Network>,
    manifest_url: Url,
    timeout: Duration,
}

impl ManifestLoader {
    pub fn new(network: Arc<dyn Network>, manifest_url: Url, timeout: Duration) -> Self {
        Self { network, manifest_url, timeout }
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    /// Load the manifest, substituting the fallback on any failure.
    pub async fn load(&self) -> LoadedManifest {
        match self.try_load().await {
            Ok(manifest) => {
                tracing::info!(
                    url = %self.manifest_url,
                    version = %manifest.cache_version,
                    strategy = %manifest.strategy,
                    "manifest loaded"
                );
                LoadedManifest { manifest, source: ManifestSource::Remote }
            }
            Err(e) => {
                tracing::warn!(url = %self.manifest_url, error = %e, "using fallback manifest");
                LoadedManifest { manifest: Manifest::fallback(self.manifest_url.as_str()), source: ManifestSource::Fallback }
            }
        }
    }

    /// Single uncached attempt, bounded by the configured timeout.
    async fn try_load(&self) -> Result<Manifest, Error> {
        let request = Request::get(self.manifest_url.clone())
            .with_cache(CacheMode::NoStore)
            .with_header("Accept", "application/json");

        let response = tokio::time::timeout(self.timeout, self.network.fetch(&request))
            .await
            .map_err(|_| Error::ManifestUnavailable(format!("timed out after {}ms", self.timeout.as_millis())))?
            .map_err(|e| Error::ManifestUnavailable(e.to_string()))?;

        if !response.ok() {
            return Err(Error::ManifestUnavailable(format!("status {}", response.status)));
        }

        Manifest::from_slice(&response.body).map_err(|e| Error::ManifestUnavailable(e.to_string()))
    }
}
