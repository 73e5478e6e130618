//! worker_message tool implementation.
//!
//! Posts a control message (`SKIP_WAITING`, `SW_REFRESH_CACHE`) to the
//! worker, either as a bare string or as `{"type": ...}`.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{ControlMessage, ServiceWorker};

use crate::tools::json_result;

/// Parameters for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// `"SKIP_WAITING"`, `"SW_REFRESH_CACHE"`, or an object with a `type` field.
    pub message: serde_json::Value,
}

/// Implementation of the worker_message tool.
pub async fn message_impl(worker: &ServiceWorker, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::from_value(&params.message)?;
    let outcome = worker.on_message(message).await?;
    json_result(&outcome)
}
