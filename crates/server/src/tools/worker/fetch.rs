//! worker_fetch tool implementation.
//!
//! Delivers an intercepted fetch to the worker. Requests the worker does not
//! handle are performed as plain network fetches and never cached.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::network::{Network, Request, RequestMode, Response};
use shellcache_core::{Error, Interception, RequestClass, ResponseSource, ServiceWorker, Strategy, keys};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Absolute URL, or a path resolved against the worker scope.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin" (default), "no-cors" or "cors".
    #[serde(default)]
    pub mode: Option<String>,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Include the response body in the output (default: true).
    #[serde(default = "default_true")]
    pub include_body: bool,
}

fn default_method() -> String {
    "GET".into()
}

fn default_true() -> bool {
    true
}

/// Who produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServedBy {
    Cache,
    Network,
    OfflineFallback,
    AppShell,
    Offline,
    /// Not intercepted; plain network fetch.
    Passthrough,
}

impl From<ResponseSource> for ServedBy {
    fn from(source: ResponseSource) -> Self {
        match source {
            ResponseSource::Cache => ServedBy::Cache,
            ResponseSource::Network => ServedBy::Network,
            ResponseSource::OfflineFallback => ServedBy::OfflineFallback,
            ResponseSource::AppShell => ServedBy::AppShell,
            ResponseSource::Offline => ServedBy::Offline,
        }
    }
}

/// Output from the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    pub url: String,
    pub served_by: ServedBy,
    pub class: Option<RequestClass>,
    pub strategy: Option<Strategy>,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub body_bytes: usize,
}

fn parse_mode(mode: Option<&str>) -> Result<RequestMode, ToolError> {
    match mode.map(str::trim) {
        None | Some("") | Some("same-origin") => Ok(RequestMode::SameOrigin),
        Some("navigate") => Ok(RequestMode::Navigate),
        Some("no-cors") => Ok(RequestMode::NoCors),
        Some("cors") => Ok(RequestMode::Cors),
        Some(other) => Err(ToolError::InvalidInput(format!("unsupported mode: {other}"))),
    }
}

fn build_request(worker: &ServiceWorker, params: &WorkerFetchParams) -> Result<Request, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let url = keys::resolve(worker.manager().scope(), &params.url).map_err(Error::from)?;
    let mode = parse_mode(params.mode.as_deref())?;

    let mut request = match mode {
        RequestMode::Navigate => Request::navigate(url),
        _ => Request { mode, ..Request::get(url) },
    }
    .with_method(params.method.as_str());

    if let Some(accept) = &params.accept {
        request.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("accept"));
        request = request.with_header("Accept", accept.as_str());
    }

    Ok(request)
}

fn render(
    response: Response, served_by: ServedBy, class: Option<RequestClass>, strategy: Option<Strategy>,
    include_body: bool,
) -> WorkerFetchOutput {
    WorkerFetchOutput {
        url: response.url.clone(),
        served_by,
        class,
        strategy,
        status: response.status,
        content_type: response.content_type().map(str::to_string),
        body: include_body.then(|| String::from_utf8_lossy(&response.body).into_owned()),
        body_bytes: response.body.len(),
        headers: response.headers,
    }
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(
    worker: &ServiceWorker, network: &Arc<dyn Network>, params: WorkerFetchParams,
) -> Result<CallToolResult, McpError> {
    let request = build_request(worker, &params)?;

    let output = match worker.on_fetch(&request).await? {
        Interception::Respond { served, class, strategy } => {
            render(served.response, served.source.into(), Some(class), Some(strategy), params.include_body)
        }
        Interception::Passthrough => {
            let response = network
                .fetch(&request)
                .await
                .map_err(|e| Error::NetworkUnavailable(format!("{}: {e}", request.url)))?;
            render(response, ServedBy::Passthrough, None, None, params.include_body)
        }
    };

    json_result(&output)
}
