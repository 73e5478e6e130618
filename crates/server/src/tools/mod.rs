//! MCP tool implementations.
//!
//! Worker tools deliver lifecycle events; cache tools inspect what the
//! worker has stored.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

pub mod cache;
pub mod worker;

/// Render a tool output as pretty JSON text content.
pub fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Serialization(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub mod testing {
    //! A small static site served from memory, and a worker over it.

    use std::sync::Arc;
    use std::time::Duration;

    use rmcp::model::{CallToolResult, RawContent};
    use shellcache_core::network::{MemoryNetwork, Network};
    use shellcache_core::{CacheDb, GenerationManager, ServiceWorker, WorkerOptions, keys};

    pub const ORIGIN: &str = "https://example.com";
    pub const MANIFEST_URL: &str = "https://example.com/health-engine.json";

    pub fn manifest(version: &str) -> String {
        format!(
            r#"{{"cacheVersion":"{version}","strategy":"cache-first","core":["/","/app.js"],"dynamicPrefixes":["/data/"],"offlineFallbackPath":"/offline.html"}}"#
        )
    }

    pub fn site(version: &str) -> Arc<MemoryNetwork> {
        Arc::new(
            MemoryNetwork::new()
                .with(MANIFEST_URL, manifest(version), "application/json")
                .with(&format!("{ORIGIN}/"), "<html>home</html>", "text/html")
                .with(&format!("{ORIGIN}/app.js"), "app()", "text/javascript")
                .with(&format!("{ORIGIN}/offline.html"), "<html>offline</html>", "text/html")
                .with(&format!("{ORIGIN}/data/today.json"), "{\"steps\":1}", "application/json")
                .with("https://api.weather.example/forecast", "{\"sunny\":true}", "application/json"),
        )
    }

    pub async fn worker(network: Arc<MemoryNetwork>, skip_waiting_on_install: bool) -> Arc<ServiceWorker> {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network: Arc<dyn Network> = network;
        let manager = GenerationManager::new(
            db,
            network,
            keys::canonicalize_scope(&format!("{ORIGIN}/")).unwrap(),
            url::Url::parse(MANIFEST_URL).unwrap(),
            Duration::from_millis(500),
            2,
        );
        Arc::new(ServiceWorker::new(manager, WorkerOptions { skip_waiting_on_install }))
    }

    /// Parse the JSON text of a successful tool result.
    pub fn output(result: &CallToolResult) -> serde_json::Value {
        let text = match &result.content[0].raw {
            RawContent::Text(text) => text.text.clone(),
            other => panic!("expected text content, got {other:?}"),
        };
        serde_json::from_str(&text).unwrap()
    }
}
