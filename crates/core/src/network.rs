//! Request/response types and the network seam used for live fetches.
//!
//! The engine never talks to a socket directly. Live fetches go through the
//! [`Network`] trait so the same strategy code runs against reqwest in the
//! server and against [`MemoryNetwork`] in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::RwLock;
use url::Url;

/// How the host issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// A document load (page navigation).
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

/// Cache behavior requested for the live fetch itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Bypass every HTTP cache between the worker and the origin.
    NoStore,
}

/// An intercepted or engine-issued request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: Url,
    pub method: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub cache: CacheMode,
}

impl Request {
    /// A plain GET with default mode.
    pub fn get(url: Url) -> Self {
        Self { url, method: "GET".into(), mode: RequestMode::default(), headers: Vec::new(), cache: CacheMode::default() }
    }

    /// A GET issued by a page navigation.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
            .with_header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response produced by the network or read back from a cache generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Final URL of the response.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The synthesized page served when a navigation has neither network
    /// nor a cached fallback.
    pub fn offline() -> Self {
        Self::new("", 503, "Offline").with_header("Content-Type", "text/plain")
    }

    /// 2xx status.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Transport-level failure of a live fetch.
///
/// HTTP error statuses are not failures; they come back as a [`Response`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response too large: {0}")]
    TooLarge(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Live network access.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Perform a live fetch.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// In-process origin serving canned responses.
///
/// Unknown URLs answer 404. Every call is counted, including calls made
/// while offline, so callers can assert that a path never touched the
/// network.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    routes: RwLock<HashMap<String, Response>>,
    failing: RwLock<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryNetwork::serve`].
    pub fn with(mut self, url: &str, body: impl Into<Bytes>, content_type: &str) -> Self {
        let response = Response::new(url, 200, body).with_header("Content-Type", content_type);
        self.routes.get_mut().insert(route_key(url), response);
        self
    }

    /// Serve `response` for `url`, replacing any previous route.
    pub async fn serve(&self, url: &str, response: Response) {
        self.routes.write().await.insert(route_key(url), response);
    }

    /// Make `url` answer with a transport failure.
    pub async fn fail(&self, url: &str) {
        self.failing.write().await.insert(route_key(url));
    }

    /// Clear a failure injected with [`MemoryNetwork::fail`].
    pub async fn heal(&self, url: &str) {
        self.failing.write().await.remove(&route_key(url));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

fn route_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[async_trait::async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Connect(format!("offline: {}", request.url)));
        }

        let key = route_key(request.url.as_str());
        if self.failing.read().await.contains(&key) {
            return Err(NetworkError::Connect(format!("injected failure: {}", request.url)));
        }

        let routes = self.routes.read().await;
        let mut without_query = request.url.clone();
        without_query.set_query(None);
        without_query.set_fragment(None);

        let response = routes
            .get(&key)
            .or_else(|| routes.get(without_query.as_str()))
            .cloned()
            .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "Not Found"));

        Ok(Response { url: request.url.to_string(), ..response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_navigate_request_accepts_html() {
        let request = Request::navigate(url("https://example.com/"));
        assert_eq!(request.mode, RequestMode::Navigate);
        assert!(request.header("accept").unwrap().contains("text/html"));
        assert!(request.is_get());
    }

    #[test]
    fn test_with_method_uppercases() {
        let request = Request::get(url("https://example.com/")).with_method("post");
        assert_eq!(request.method, "POST");
        assert!(!request.is_get());
    }

    #[test]
    fn test_response_ok_range() {
        assert!(Response::new("", 200, "").ok());
        assert!(Response::new("", 204, "").ok());
        assert!(!Response::new("", 304, "").ok());
        assert!(!Response::new("", 404, "").ok());
    }

    #[test]
    fn test_offline_response() {
        let response = Response::offline();
        assert_eq!(response.status, 503);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(&response.body[..], b"Offline");
    }

    #[tokio::test]
    async fn test_memory_network_serves_routes() {
        let network = MemoryNetwork::new().with("https://example.com/app.js", "console.log(1)", "text/javascript");
        let response = network.fetch(&Request::get(url("https://example.com/app.js"))).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("text/javascript"));
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_network_ignores_query_when_unrouted() {
        let network = MemoryNetwork::new().with("https://example.com/data.json", "{}", "application/json");
        let response = network.fetch(&Request::get(url("https://example.com/data.json?t=1"))).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.url, "https://example.com/data.json?t=1");
    }

    #[tokio::test]
    async fn test_memory_network_unknown_is_404() {
        let network = MemoryNetwork::new();
        let response = network.fetch(&Request::get(url("https://example.com/missing"))).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_memory_network_offline_counts_calls() {
        let network = MemoryNetwork::new().with("https://example.com/", "<html>", "text/html");
        network.set_offline(true);
        let result = network.fetch(&Request::get(url("https://example.com/"))).await;
        assert!(matches!(result, Err(NetworkError::Connect(_))));
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_network_fail_and_heal() {
        let network = MemoryNetwork::new().with("https://example.com/a.css", "a{}", "text/css");
        network.fail("https://example.com/a.css").await;
        assert!(network.fetch(&Request::get(url("https://example.com/a.css"))).await.is_err());
        network.heal("https://example.com/a.css").await;
        assert!(network.fetch(&Request::get(url("https://example.com/a.css"))).await.is_ok());
    }
}
