//! worker_activate tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use shellcache_core::ServiceWorker;

use crate::tools::json_result;

/// Deliver an activate event.
pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let report = worker.on_activate().await?;
    json_result(&report)
}
