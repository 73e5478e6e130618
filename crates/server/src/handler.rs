//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shellcache_core::{Network, ServiceWorker};

use crate::tools::cache::{CacheGetParams, get_impl, list_impl};
use crate::tools::worker::{
    WorkerFetchParams, WorkerMessageParams, activate_impl, fetch_impl, install_impl, message_impl,
};

/// The MCP server hosting one worker.
#[derive(Clone)]
pub struct ShellcacheServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<ServiceWorker>,
    network: Arc<dyn Network>,
}

#[tool_router]
impl ShellcacheServer {
    /// Create a new server handler.
    ///
    /// `network` performs the plain fetches for requests the worker passes
    /// through.
    pub fn new(worker: Arc<ServiceWorker>, network: Arc<dyn Network>) -> Self {
        Self { tool_router: Self::tool_router(), worker, network }
    }

    #[tool(
        description = "Deliver an install event: load the manifest, precache every asset atomically. Activates immediately when skip-waiting is enabled."
    )]
    async fn worker_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Deliver an activate event: promote the installed generation and delete all others.")]
    async fn worker_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(description = "Post a control message to the worker: SKIP_WAITING or SW_REFRESH_CACHE.")]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Deliver an intercepted fetch. Returns the response and whether it came from the cache, the network, or the offline fallback."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, &self.network, params.0).await
    }

    #[tool(description = "List cache generations with entry counts, and which one is active.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.worker).await
    }

    #[tool(description = "Read one cached entry by path or URL from the active (or a named) generation.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for ShellcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Hosts one offline-caching worker. Call worker_install first, then worker_fetch to serve requests."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{site, worker};

    #[tokio::test]
    async fn test_registers_all_tools() {
        let network = site("v1");
        let server = ShellcacheServer::new(worker(network.clone(), true).await, network);

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["cache_get", "cache_list", "worker_activate", "worker_fetch", "worker_install", "worker_message"]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let network = site("v1");
        let server = ShellcacheServer::new(worker(network.clone(), true).await, network);
        let info = server.get_info();
        assert_eq!(info.server_info.name, "shellcache");
    }
}
