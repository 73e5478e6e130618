//! cache_get tool implementation.
//!
//! Reads one stored entry by path, key, or URL.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::cache::EntryOrigin;
use shellcache_core::{Error, ServiceWorker, keys};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Path or URL of the entry; normalized against the worker scope.
    pub key: String,

    /// Generation to read (default: the active one).
    #[serde(default)]
    pub generation: Option<String>,

    /// Fall back to an entry with a different query string (default: true).
    #[serde(default = "default_true")]
    pub ignore_search: bool,
}

fn default_true() -> bool {
    true
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub generation: String,
    pub cache_key: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub origin: EntryOrigin,
    pub stored_at: String,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub body_bytes: usize,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    if params.key.trim().is_empty() {
        return Err(ToolError::InvalidInput("key cannot be empty".into()).into());
    }

    let manager = worker.manager();
    let key = keys::normalize_key(manager.scope(), &params.key).map_err(Error::from)?;

    let generation = match params.generation {
        Some(name) => name,
        None => {
            worker
                .active()
                .await
                .ok_or_else(|| Error::NoActiveGeneration("no generation is active".into()))?
                .generation
                .clone()
        }
    };

    let entry = manager
        .db()
        .match_entry(&generation, &key, params.ignore_search)
        .await?
        .ok_or_else(|| ToolError::CacheMiss(format!("{key} in {generation}")))?;

    let output = CacheGetOutput {
        generation,
        cache_key: entry.cache_key,
        url: entry.url,
        status: entry.status,
        content_type: entry.content_type,
        headers: entry.headers,
        origin: entry.origin,
        stored_at: entry.stored_at,
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        body_bytes: entry.body.len(),
    };

    json_result(&output)
}
