//! Fetch strategies over one open cache generation.
//!
//! ### Strategies
//! - cache-first: serve a cached match, touch the network only on a miss.
//! - network-first: prefer the live response, fall back to the cache.
//! - stale-while-revalidate: serve the cached match now and refresh it in
//!   the background; wait for the network only on a miss.
//!
//! The executor reads and writes entries in the generation it was built
//! for. It never creates or deletes generations.

use std::future::Future;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::Error;
use crate::cache::{CacheDb, CachedEntry, EntryOrigin};
use crate::generation::ActiveManifest;
use crate::keys;
use crate::manifest::Strategy;
use crate::network::{Network, Request, Response};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    /// The cached offline fallback page.
    OfflineFallback,
    /// The cached app shell document.
    AppShell,
    /// Synthesized 503 when nothing else was available.
    Offline,
}

/// A response together with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl Served {
    fn cache(response: Response) -> Self {
        Self { response, source: ResponseSource::Cache }
    }

    fn network(response: Response) -> Self {
        Self { response, source: ResponseSource::Network }
    }
}

/// Fire-and-forget tasks spawned by stale-while-revalidate.
///
/// Failures are logged and swallowed; [`BackgroundTasks::settle`] waits for
/// whatever is still running.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait for every outstanding background task.
    pub async fn settle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task panicked or was cancelled");
            }
        }
    }
}

/// Write a live response into a generation, logging instead of failing.
async fn store(db: &CacheDb, generation: &str, key: &str, response: &Response) {
    let entry = CachedEntry::from_response(key, response, EntryOrigin::Runtime);
    match db.put_entry(generation, &entry).await {
        Ok(()) => tracing::debug!(generation, key, "runtime cache write"),
        Err(e) => tracing::warn!(generation, key, error = %e, "runtime cache write failed"),
    }
}

/// Runs the caching algorithms against one generation.
#[derive(Clone)]
pub struct StrategyExecutor {
    db: CacheDb,
    active: Arc<ActiveManifest>,
    network: Arc<dyn Network>,
    background: BackgroundTasks,
}

impl StrategyExecutor {
    pub fn new(
        db: CacheDb, active: Arc<ActiveManifest>, network: Arc<dyn Network>, background: BackgroundTasks,
    ) -> Self {
        Self { db, active, network, background }
    }

    pub fn active(&self) -> &Arc<ActiveManifest> {
        &self.active
    }

    pub fn generation(&self) -> &str {
        &self.active.generation
    }

    pub fn key_for(&self, request: &Request) -> String {
        keys::cache_key(&self.active.scope, &request.url)
    }

    /// Dispatch to the named strategy.
    pub async fn execute(&self, strategy: Strategy, request: &Request) -> Result<Served, Error> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Query-insensitive lookup in the open generation.
    pub async fn lookup(&self, key: &str) -> Result<Option<Response>, Error> {
        let entry = self.db.match_entry(&self.active.generation, key, true).await?;
        Ok(entry.map(|e| e.to_response()))
    }

    async fn live(&self, request: &Request) -> Result<Response, Error> {
        self.network
            .fetch(request)
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("{}: {e}", request.url)))
    }

    /// Store when the response is 2xx and the request qualifies for runtime
    /// caching.
    async fn store_if_qualified(&self, request: &Request, key: &str, response: &Response) {
        if response.ok() && self.active.rules.qualifies(request) {
            store(&self.db, &self.active.generation, key, response).await;
        } else {
            tracing::trace!(key, status = response.status, "runtime cache write skipped");
        }
    }

    pub async fn cache_first(&self, request: &Request) -> Result<Served, Error> {
        let key = self.key_for(request);

        if let Some(hit) = self.lookup(&key).await? {
            tracing::debug!(key = %key, "cache-first hit");
            return Ok(Served::cache(hit));
        }

        let response = self.live(request).await?;
        self.store_if_qualified(request, &key, &response).await;
        Ok(Served::network(response))
    }

    pub async fn network_first(&self, request: &Request) -> Result<Served, Error> {
        let key = self.key_for(request);

        match self.live(request).await {
            Ok(response) => {
                if response.ok() && self.active.rules.is_storable(request) {
                    store(&self.db, &self.active.generation, &key, &response).await;
                }
                Ok(Served::network(response))
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "network-first falling back to cache");
                self.lookup(&key).await?.map(Served::cache).ok_or(e)
            }
        }
    }

    pub async fn stale_while_revalidate(&self, request: &Request) -> Result<Served, Error> {
        let key = self.key_for(request);

        match self.lookup(&key).await? {
            Some(hit) => {
                tracing::debug!(key = %key, "serving stale entry, revalidating");
                self.revalidate(request, key).await;
                Ok(Served::cache(hit))
            }
            None => {
                let response = self.live(request).await?;
                self.store_if_qualified(request, &key, &response).await;
                Ok(Served::network(response))
            }
        }
    }

    /// Refresh an existing entry without blocking the caller.
    async fn revalidate(&self, request: &Request, key: String) {
        if !self.active.rules.is_storable(request) {
            return;
        }

        let db = self.db.clone();
        let generation = self.active.generation.clone();
        let network = self.network.clone();
        let request = request.clone();

        self.background
            .spawn(async move {
                match network.fetch(&request).await {
                    Ok(response) if response.ok() => store(&db, &generation, &key, &response).await,
                    Ok(response) => tracing::debug!(key = %key, status = response.status, "revalidation not stored"),
                    Err(e) => tracing::debug!(key = %key, error = %e, "background revalidation failed"),
                }
            })
            .await;
    }
}
