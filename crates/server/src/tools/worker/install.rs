//! worker_install tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use shellcache_core::ServiceWorker;

use crate::tools::json_result;

/// Deliver an install event.
pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let outcome = worker.on_install().await?;
    json_result(&outcome)
}
