//! cache_list tool implementation.
//!
//! Lists stored generations and which one is serving.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{GenerationInfo, ServiceWorker, Strategy, WorkerState};

use crate::tools::json_result;

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub state: WorkerState,
    pub scope: String,
    /// Generation serving fetches.
    pub active: Option<String>,
    /// Installed generation awaiting activation.
    pub waiting: Option<String>,
    pub strategy: Option<Strategy>,
    pub generations: Vec<GenerationInfo>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let active = worker.active().await;
    let waiting = worker.manager().waiting().await;

    let output = CacheListOutput {
        state: worker.state().await,
        scope: worker.manager().scope().to_string(),
        active: active.as_ref().map(|a| a.generation.clone()),
        waiting: waiting.map(|w| w.generation.clone()),
        strategy: active.map(|a| a.manifest.strategy),
        generations: worker.manager().db().list_generations().await?,
    };

    json_result(&output)
}
