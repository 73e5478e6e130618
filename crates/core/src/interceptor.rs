//! Classifies intercepted requests and dispatches them to a strategy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::keys;
use crate::manifest::Strategy;
use crate::network::{Request, RequestMode, Response};
use crate::strategy::{ResponseSource, Served, StrategyExecutor};

/// Request class used to choose a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// A document load.
    Navigation,
    Asset,
}

/// Navigation when the host says so or the request accepts HTML.
pub fn classify(request: &Request) -> RequestClass {
    let accepts_html = request
        .header("accept")
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("text/html"));

    if request.mode == RequestMode::Navigate || accepts_html {
        RequestClass::Navigation
    } else {
        RequestClass::Asset
    }
}

/// What the interceptor decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Not ours: the host performs a plain fetch and nothing is cached.
    Passthrough,
    Respond { served: Served, class: RequestClass, strategy: Strategy },
}

/// Entry point for every intercepted fetch.
#[derive(Clone)]
pub struct FetchInterceptor {
    executor: StrategyExecutor,
}

impl FetchInterceptor {
    pub fn new(executor: StrategyExecutor) -> Self {
        Self { executor }
    }

    /// Handle one request.
    ///
    /// Navigations always go network-first. Offline they end at the cached
    /// fallback page, then the cached app shell, then a synthesized 503,
    /// never an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::NetworkUnavailable` for an asset that is neither live
    /// nor cached.
    pub async fn handle(&self, request: &Request) -> Result<Interception, Error> {
        let active = self.executor.active();

        if !request.is_get() || !keys::in_scope(&active.scope, &request.url) {
            tracing::trace!(method = %request.method, url = %request.url, "passthrough");
            return Ok(Interception::Passthrough);
        }

        let class = classify(request);
        match class {
            RequestClass::Navigation => {
                let served = self.navigate(request).await?;
                Ok(Interception::Respond { served, class, strategy: Strategy::NetworkFirst })
            }
            RequestClass::Asset => {
                let strategy = active.manifest.strategy;
                let served = self.executor.execute(strategy, request).await?;
                Ok(Interception::Respond { served, class, strategy })
            }
        }
    }

    async fn navigate(&self, request: &Request) -> Result<Served, Error> {
        match self.executor.network_first(request).await {
            Ok(served) => Ok(served),
            Err(Error::NetworkUnavailable(reason)) => {
                if let Some(key) = self.executor.active().offline_fallback_key()
                    && let Some(response) = self.executor.lookup(&key).await?
                {
                    tracing::info!(url = %request.url, fallback = %key, "serving offline fallback page");
                    return Ok(Served { response, source: ResponseSource::OfflineFallback });
                }

                if let Some(key) = self.executor.active().app_shell_key()
                    && let Some(response) = self.executor.lookup(&key).await?
                {
                    tracing::info!(url = %request.url, shell = %key, "serving cached app shell");
                    return Ok(Served { response, source: ResponseSource::AppShell });
                }

                tracing::info!(url = %request.url, reason = %reason, "navigation offline, no fallback cached");
                Ok(Served { response: Response::offline(), source: ResponseSource::Offline })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{CacheDb, CachedEntry, EntryOrigin, PopulateMode};
    use crate::generation::ActiveManifest;
    use crate::manifest::{LoadedManifest, Manifest, ManifestSource};
    use crate::network::MemoryNetwork;
    use crate::strategy::BackgroundTasks;
    use url::Url;

    const ORIGIN: &str = "https://example.com";

    fn url(path: &str) -> Url {
        Url::parse(&format!("{ORIGIN}{path}")).unwrap()
    }

    async fn setup(json: &str, network: MemoryNetwork) -> (FetchInterceptor, Arc<MemoryNetwork>, CacheDb) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let loaded = LoadedManifest { manifest: Manifest::from_slice(json.as_bytes()).unwrap(), source: ManifestSource::Remote };
        let scope = keys::canonicalize_scope(&format!("{ORIGIN}/")).unwrap();
        let active = Arc::new(ActiveManifest::new(loaded, scope, url("/health-engine.json")).unwrap());
        db.open_generation(&active.generation).await.unwrap();

        let network = Arc::new(network);
        let executor = StrategyExecutor::new(db.clone(), active, network.clone(), BackgroundTasks::default());
        (FetchInterceptor::new(executor), network, db)
    }

    async fn seed(db: &CacheDb, key: &str, body: &str) {
        seed_in(db, "v1", key, body).await;
    }

    async fn seed_in(db: &CacheDb, generation: &str, key: &str, body: &str) {
        let response = Response::new(format!("{ORIGIN}/{}", key.trim_start_matches("./")), 200, body.to_string())
            .with_header("Content-Type", "text/html");
        let entry = CachedEntry::from_response(key, &response, EntryOrigin::Precache);
        db.populate_generation(generation, vec![entry], PopulateMode::Merge).await.unwrap();
    }

    fn served(interception: Interception) -> Served {
        match interception {
            Interception::Respond { served, .. } => served,
            Interception::Passthrough => panic!("expected a response"),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&Request::navigate(url("/"))), RequestClass::Navigation);
        assert_eq!(classify(&Request::get(url("/page")).with_header("Accept", "Text/HTML")), RequestClass::Navigation);
        assert_eq!(classify(&Request::get(url("/app.js"))), RequestClass::Asset);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let (interceptor, network, _db) = setup(r#"{"cacheVersion":"v1"}"#, MemoryNetwork::new()).await;
        let request = Request::get(url("/api/save")).with_method("POST");
        assert_eq!(interceptor.handle(&request).await.unwrap(), Interception::Passthrough);
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_passes_through() {
        let (interceptor, network, db) = setup(r#"{"cacheVersion":"v1"}"#, MemoryNetwork::new()).await;
        let request = Request::get(Url::parse("https://api.weather.example/v1/forecast.json").unwrap());
        assert_eq!(interceptor.handle(&request).await.unwrap(), Interception::Passthrough);
        assert_eq!(network.calls(), 0);
        assert!(db.entry_keys("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_forces_network_first_and_updates_cache() {
        let network = MemoryNetwork::new().with(&format!("{ORIGIN}/"), "<html>new</html>", "text/html");
        let (interceptor, network, db) = setup(r#"{"cacheVersion":"v1","strategy":"cache-first"}"#, network).await;
        seed(&db, "./", "<html>old</html>").await;

        let interception = interceptor.handle(&Request::navigate(url("/"))).await.unwrap();
        let Interception::Respond { served, class, strategy } = interception else {
            panic!("expected a response");
        };
        assert_eq!(class, RequestClass::Navigation);
        assert_eq!(strategy, Strategy::NetworkFirst);
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(&served.response.body[..], b"<html>new</html>");
        assert_eq!(network.calls(), 1);

        let stored = db.match_entry("v1", "./", false).await.unwrap().unwrap();
        assert_eq!(&stored.body[..], b"<html>new</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_uses_cached_page() {
        let (interceptor, network, db) = setup(r#"{"cacheVersion":"v1"}"#, MemoryNetwork::new()).await;
        seed(&db, "./about.html", "<html>about</html>").await;
        network.set_offline(true);

        let served = served(interceptor.handle(&Request::navigate(url("/about.html"))).await.unwrap());
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(&served.response.body[..], b"<html>about</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_fallback_page() {
        let json = r#"{"cacheVersion":"v1","offlineFallbackPath":"/offline.html"}"#;
        let (interceptor, network, db) = setup(json, MemoryNetwork::new()).await;
        seed(&db, "./offline.html", "<html>offline</html>").await;
        network.set_offline(true);

        let served = served(interceptor.handle(&Request::navigate(url("/missing"))).await.unwrap());
        assert_eq!(served.source, ResponseSource::OfflineFallback);
        assert_eq!(&served.response.body[..], b"<html>offline</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_app_shell() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let loaded = LoadedManifest { manifest: Manifest::fallback("./health-engine.json"), source: ManifestSource::Fallback };
        let scope = keys::canonicalize_scope(&format!("{ORIGIN}/")).unwrap();
        let active = Arc::new(ActiveManifest::new(loaded, scope, url("/health-engine.json")).unwrap());
        db.open_generation(&active.generation).await.unwrap();
        seed_in(&db, &active.generation, "./index.html", "<html>shell</html>").await;

        let network = Arc::new(MemoryNetwork::new());
        network.set_offline(true);
        let executor = StrategyExecutor::new(db.clone(), active, network.clone(), BackgroundTasks::default());
        let interceptor = FetchInterceptor::new(executor);

        let served = served(interceptor.handle(&Request::navigate(url("/journal/2024"))).await.unwrap());
        assert_eq!(served.source, ResponseSource::AppShell);
        assert_eq!(served.response.status, 200);
        assert_eq!(&served.response.body[..], b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_fallback_page_wins_over_app_shell() {
        let json = r#"{"cacheVersion":"v1","offlineFallbackPath":"/offline.html"}"#;
        let (interceptor, network, db) = setup(json, MemoryNetwork::new()).await;
        seed(&db, "./index.html", "<html>shell</html>").await;
        seed(&db, "./offline.html", "<html>offline</html>").await;
        network.set_offline(true);

        let served = served(interceptor.handle(&Request::navigate(url("/missing"))).await.unwrap());
        assert_eq!(served.source, ResponseSource::OfflineFallback);
    }

    #[tokio::test]
    async fn test_same_origin_outside_scope_passes_through() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let loaded = LoadedManifest {
            manifest: Manifest::from_slice(br#"{"cacheVersion":"v1"}"#).unwrap(),
            source: ManifestSource::Remote,
        };
        let scope = keys::canonicalize_scope(&format!("{ORIGIN}/app/")).unwrap();
        let active = Arc::new(ActiveManifest::new(loaded, scope, url("/app/health-engine.json")).unwrap());
        db.open_generation(&active.generation).await.unwrap();

        let network = Arc::new(MemoryNetwork::new().with(&format!("{ORIGIN}/app/main.js"), "main()", "text/javascript"));
        let executor = StrategyExecutor::new(db.clone(), active, network.clone(), BackgroundTasks::default());
        let interceptor = FetchInterceptor::new(executor);

        assert_eq!(interceptor.handle(&Request::get(url("/other/x.js"))).await.unwrap(), Interception::Passthrough);
        assert_eq!(interceptor.handle(&Request::navigate(url("/other/"))).await.unwrap(), Interception::Passthrough);
        assert_eq!(network.calls(), 0);

        let inside = interceptor.handle(&Request::get(url("/app/main.js"))).await.unwrap();
        assert!(matches!(inside, Interception::Respond { .. }));
    }

    #[tokio::test]
    async fn test_offline_navigation_without_fallback_is_503() {
        let (interceptor, network, _db) = setup(r#"{"cacheVersion":"v1"}"#, MemoryNetwork::new()).await;
        network.set_offline(true);

        let served = served(interceptor.handle(&Request::navigate(url("/missing"))).await.unwrap());
        assert_eq!(served.source, ResponseSource::Offline);
        assert_eq!(served.response.status, 503);
        assert_eq!(&served.response.body[..], b"Offline");
    }

    #[tokio::test]
    async fn test_asset_uses_manifest_strategy() {
        let network = MemoryNetwork::new().with(&format!("{ORIGIN}/app.js"), "live()", "text/javascript");
        let json = r#"{"cacheVersion":"v1","strategy":"stale-while-revalidate"}"#;
        let (interceptor, _network, _db) = setup(json, network).await;

        let interception = interceptor.handle(&Request::get(url("/app.js"))).await.unwrap();
        let Interception::Respond { class, strategy, .. } = interception else {
            panic!("expected a response");
        };
        assert_eq!(class, RequestClass::Asset);
        assert_eq!(strategy, Strategy::StaleWhileRevalidate);
    }

    #[tokio::test]
    async fn test_offline_asset_miss_propagates() {
        let (interceptor, network, _db) = setup(r#"{"cacheVersion":"v1"}"#, MemoryNetwork::new()).await;
        network.set_offline(true);

        let result = interceptor.handle(&Request::get(url("/app.js"))).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
    }
}
