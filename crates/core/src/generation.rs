//! Cache generation lifecycle: install, activate, refresh.
//!
//! The manager owns creation and deletion of generations. The manifest in
//! use is held as an immutable [`ActiveManifest`] behind an `Arc`; events
//! take a snapshot once and keep it for their whole run, so a concurrent
//! refresh swaps the pointer without any handler seeing a half-updated
//! configuration.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use url::Url;

use crate::Error;
use crate::cache::{CacheDb, CachedEntry, EntryOrigin, PopulateMode};
use crate::keys;
use crate::manifest::{LoadedManifest, Manifest, ManifestLoader, ManifestSource, Strategy};
use crate::network::{Network, Request};
use crate::precache::{PrecacheAsset, compute_asset_set};
use crate::runtime::RuntimeRules;
use crate::strategy::{BackgroundTasks, StrategyExecutor};

/// App shell document, relative to the scope.
pub const APP_SHELL_PATH: &str = "./index.html";

/// A loaded manifest bound to its scope, with derived state precomputed.
#[derive(Debug)]
pub struct ActiveManifest {
    pub manifest: Manifest,
    pub source: ManifestSource,
    pub generation: String,
    pub scope: Url,
    pub manifest_url: Url,
    pub rules: RuntimeRules,
}

impl ActiveManifest {
    pub fn new(loaded: LoadedManifest, scope: Url, manifest_url: Url) -> Result<Self, Error> {
        let rules = RuntimeRules::from_manifest(&loaded.manifest, &scope)?;
        Ok(Self {
            generation: loaded.manifest.generation_name(),
            manifest: loaded.manifest,
            source: loaded.source,
            scope,
            manifest_url,
            rules,
        })
    }

    pub fn asset_set(&self) -> Vec<PrecacheAsset> {
        compute_asset_set(&self.manifest, &self.manifest_url, &self.scope)
    }

    /// Normalized key of the offline fallback page, if configured.
    pub fn offline_fallback_key(&self) -> Option<String> {
        let path = self.manifest.offline_fallback_path.as_deref()?;
        keys::normalize_key(&self.scope, path).ok()
    }

    /// Key of the app shell document served to offline navigations that have
    /// no fallback page.
    pub fn app_shell_key(&self) -> Option<String> {
        keys::normalize_key(&self.scope, APP_SHELL_PATH).ok()
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallReport {
    pub generation: String,
    pub version: String,
    pub strategy: Strategy,
    /// True when the remote manifest was unusable and the fallback was installed.
    pub fallback_manifest: bool,
    /// True when this install created the generation rather than re-filling it.
    pub created: bool,
    pub assets: Vec<String>,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateReport {
    pub current: String,
    pub deleted: Vec<String>,
}

/// Outcome of a manual refresh.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RefreshReport {
    pub install: InstallReport,
    pub activate: ActivateReport,
}

/// Owns the versioned cache namespace.
pub struct GenerationManager {
    db: CacheDb,
    network: Arc<dyn Network>,
    loader: ManifestLoader,
    scope: Url,
    install_concurrency: usize,
    waiting: RwLock<Option<Arc<ActiveManifest>>>,
    active: RwLock<Option<Arc<ActiveManifest>>>,
    background: BackgroundTasks,
}

impl GenerationManager {
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, scope: Url, manifest_url: Url, manifest_timeout: Duration,
        install_concurrency: usize,
    ) -> Self {
        let loader = ManifestLoader::new(network.clone(), manifest_url, manifest_timeout);
        Self {
            db,
            network,
            loader,
            scope,
            install_concurrency: install_concurrency.max(1),
            waiting: RwLock::new(None),
            active: RwLock::new(None),
            background: BackgroundTasks::default(),
        }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Manifest currently serving fetches.
    pub async fn active(&self) -> Option<Arc<ActiveManifest>> {
        self.active.read().await.clone()
    }

    /// Installed manifest waiting for activation.
    pub async fn waiting(&self) -> Option<Arc<ActiveManifest>> {
        self.waiting.read().await.clone()
    }

    /// Strategy executor bound to a manifest snapshot.
    pub fn executor(&self, active: Arc<ActiveManifest>) -> StrategyExecutor {
        StrategyExecutor::new(self.db.clone(), active, self.network.clone(), self.background.clone())
    }

    /// Wait for background revalidations to finish.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Load the manifest and populate its generation.
    ///
    /// Population is all-or-nothing: every asset is fetched first and only
    /// when all of them succeed are they written, together with the
    /// generation row, in one transaction. A failed install therefore leaves
    /// no generation behind and can simply be retried.
    ///
    /// # Errors
    ///
    /// Returns `Error::PartialInstallFailure` listing the keys that failed.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.install_with(PopulateMode::Merge).await
    }

    async fn install_with(&self, mode: PopulateMode) -> Result<InstallReport, Error> {
        let loaded = self.loader.load().await;
        let next = Arc::new(ActiveManifest::new(loaded, self.scope.clone(), self.loader.manifest_url().clone())?);
        let assets = next.asset_set();

        tracing::info!(generation = %next.generation, assets = assets.len(), "installing cache generation");

        let entries = match self.fetch_assets(&assets).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(generation = %next.generation, error = %e, "install aborted, nothing committed");
                return Err(e);
            }
        };

        let created = self.db.populate_generation(&next.generation, entries, mode).await?;

        let report = InstallReport {
            generation: next.generation.clone(),
            version: next.manifest.cache_version.clone(),
            strategy: next.manifest.strategy,
            fallback_manifest: next.source == ManifestSource::Fallback,
            created,
            assets: assets.into_iter().map(|a| a.key).collect(),
        };

        *self.waiting.write().await = Some(next);

        tracing::info!(generation = %report.generation, created, "install complete");
        Ok(report)
    }

    /// Fetch every asset with bounded concurrency; fail if any fetch fails.
    async fn fetch_assets(&self, assets: &[PrecacheAsset]) -> Result<Vec<CachedEntry>, Error> {
        let semaphore = Arc::new(Semaphore::new(self.install_concurrency));
        let mut join_set = JoinSet::new();

        for asset in assets.iter().cloned() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::InvalidState(format!("precache semaphore closed: {e}")))?;
            let network = self.network.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let result = network.fetch(&Request::get(asset.url.clone())).await;
                (asset, result)
            });
        }

        let mut entries = Vec::with_capacity(assets.len());
        let mut failed = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let (asset, result) = joined.map_err(|e| Error::InvalidState(format!("precache task failed: {e}")))?;
            match result {
                Ok(response) if response.ok() => {
                    entries.push(CachedEntry::from_response(&asset.key, &response, EntryOrigin::Precache));
                }
                Ok(response) => {
                    tracing::warn!(key = %asset.key, status = response.status, "precache fetch rejected");
                    failed.push(asset.key);
                }
                Err(e) => {
                    tracing::warn!(key = %asset.key, error = %e, "precache fetch failed");
                    failed.push(asset.key);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return Err(Error::PartialInstallFailure { failed });
        }

        entries.sort_by(|a, b| a.cache_key.cmp(&b.cache_key));
        Ok(entries)
    }

    /// Promote the installed manifest and delete every other generation.
    ///
    /// With nothing waiting, re-runs eviction for the active manifest, so
    /// activate is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoActiveGeneration` if nothing was ever installed.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let waiting = self.waiting.write().await.take();
        let current = match waiting {
            Some(next) => {
                *self.active.write().await = Some(next.clone());
                next
            }
            None => self
                .active()
                .await
                .ok_or_else(|| Error::NoActiveGeneration("nothing has been installed".into()))?,
        };

        let mut deleted = Vec::new();
        for name in self.db.generation_names().await? {
            if name != current.generation && self.db.delete_generation(&name).await? {
                tracing::info!(generation = %name, "deleted stale cache generation");
                deleted.push(name);
            }
        }

        tracing::info!(generation = %current.generation, evicted = deleted.len(), "activated");
        Ok(ActivateReport { current: current.generation.clone(), deleted })
    }

    /// Re-fetch the manifest, re-populate, and activate.
    ///
    /// The generation's old entries are replaced in the same transaction that
    /// writes the new ones, so a failed refresh keeps serving the old content.
    pub async fn refresh(&self) -> Result<RefreshReport, Error> {
        tracing::info!("refreshing cache on request");
        let install = self.install_with(PopulateMode::Replace).await?;
        let activate = self.activate().await?;
        Ok(RefreshReport { install, activate })
    }
}
