//! shellcache server entry point.
//!
//! Boots one worker over the configured scope and serves its lifecycle
//! events as MCP tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchConfig, HttpNetwork};
use shellcache_core::{AppConfig, CacheDb, GenerationManager, Network, ServiceWorker, WorkerOptions};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let scope = config.scope()?;
    let manifest_url = config.manifest_url()?;

    tracing::info!(scope = %scope, manifest = %manifest_url, db = %config.db_path.display(), "starting shellcache on stdio transport");

    let db = CacheDb::open(&config.db_path).await.context("opening cache database")?;
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);

    let manager = GenerationManager::new(
        db,
        network.clone(),
        scope,
        manifest_url,
        config.manifest_timeout(),
        config.install_concurrency,
    );
    let worker = Arc::new(ServiceWorker::new(
        manager,
        WorkerOptions { skip_waiting_on_install: config.skip_waiting_on_install },
    ));

    // Registration installs right away; a failure leaves the worker in
    // `parsed` and worker_install can retry it.
    if let Err(e) = worker.on_install().await {
        tracing::warn!(error = %e, "initial install failed");
    }

    let handler = handler::ShellcacheServer::new(worker.clone(), network);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    worker.settle().await;

    Ok(())
}
