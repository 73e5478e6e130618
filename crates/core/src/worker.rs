//! Worker lifecycle: the event surface the host drives.
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//! ```
//!
//! A failed install goes back to the state it started from, a failed
//! activate back to `Installed`. Once activated, a new install (a manifest
//! version bump) runs from `Activated` while the old generation keeps
//! serving fetches until the next activation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Error;
use crate::generation::{ActivateReport, ActiveManifest, GenerationManager, InstallReport, RefreshReport};
use crate::interceptor::{FetchInterceptor, Interception};
use crate::network::Request;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        };
        f.write_str(s)
    }
}

/// Messages a controlled page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting install now.
    SkipWaiting,
    /// Re-fetch the manifest and re-populate the cache.
    RefreshCache,
}

impl ControlMessage {
    pub const SKIP_WAITING: &'static str = "SKIP_WAITING";
    pub const REFRESH_CACHE: &'static str = "SW_REFRESH_CACHE";

    /// Accept either a bare string or an object with a `type` field.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for any other shape or an unknown type.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, Error> {
        let kind = match value {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Object(map) => map
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| Error::InvalidInput("message object has no string \"type\"".into()))?,
            other => return Err(Error::InvalidInput(format!("unsupported message: {other}"))),
        };
        kind.parse()
    }
}

impl FromStr for ControlMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            Self::SKIP_WAITING => Ok(ControlMessage::SkipWaiting),
            Self::REFRESH_CACHE => Ok(ControlMessage::RefreshCache),
            other => Err(Error::InvalidInput(format!("unknown message type: {other}"))),
        }
    }
}

/// Result of handling a control message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Activated(ActivateReport),
    /// `SKIP_WAITING` with no install waiting.
    NothingWaiting,
    Refreshed(RefreshReport),
}

/// Result of an install event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutcome {
    pub install: InstallReport,
    /// Present when the worker skipped waiting and activated immediately.
    pub activate: Option<ActivateReport>,
    pub state: WorkerState,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Activate right after a successful install.
    pub skip_waiting_on_install: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { skip_waiting_on_install: true }
    }
}

/// One registered worker and its cache.
pub struct ServiceWorker {
    manager: GenerationManager,
    state: RwLock<WorkerState>,
    options: WorkerOptions,
}

impl ServiceWorker {
    pub fn new(manager: GenerationManager, options: WorkerOptions) -> Self {
        Self { manager, state: RwLock::new(WorkerState::Parsed), options }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn manager(&self) -> &GenerationManager {
        &self.manager
    }

    /// Manifest serving fetches, if any.
    pub async fn active(&self) -> Option<Arc<ActiveManifest>> {
        self.manager.active().await
    }

    /// Wait for background revalidations.
    pub async fn settle(&self) {
        self.manager.settle().await;
    }

    /// Move into `next`, returning the previous state.
    async fn enter(&self, next: WorkerState) -> Result<WorkerState, Error> {
        let mut state = self.state.write().await;
        let previous = *state;
        if matches!(previous, WorkerState::Installing | WorkerState::Activating) {
            return Err(Error::InvalidState(format!("cannot start {next} while {previous}")));
        }
        *state = next;
        Ok(previous)
    }

    async fn set(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        tracing::debug!(from = %*state, to = %next, "worker state change");
        *state = next;
    }

    /// Handle the install event.
    ///
    /// # Errors
    ///
    /// Propagates `Error::PartialInstallFailure`; the worker returns to the
    /// state it was in.
    pub async fn on_install(&self) -> Result<InstallOutcome, Error> {
        let previous = self.enter(WorkerState::Installing).await?;

        let install = match self.manager.install().await {
            Ok(report) => report,
            Err(e) => {
                self.set(previous).await;
                return Err(e);
            }
        };
        self.set(WorkerState::Installed).await;

        let activate = if self.options.skip_waiting_on_install {
            tracing::info!(generation = %install.generation, "skipping waiting after install");
            Some(self.on_activate().await?)
        } else {
            None
        };

        Ok(InstallOutcome { install, activate, state: self.state().await })
    }

    /// Handle the activate event.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoActiveGeneration` if nothing was installed.
    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        let previous = self.enter(WorkerState::Activating).await?;

        match self.manager.activate().await {
            Ok(report) => {
                self.set(WorkerState::Activated).await;
                Ok(report)
            }
            Err(e) => {
                let back = if previous == WorkerState::Parsed { previous } else { WorkerState::Installed };
                self.set(back).await;
                Err(e)
            }
        }
    }

    /// Handle an intercepted fetch.
    ///
    /// Before the first activation nothing is controlled and every request
    /// passes through.
    pub async fn on_fetch(&self, request: &Request) -> Result<Interception, Error> {
        let Some(active) = self.manager.active().await else {
            tracing::trace!(url = %request.url, "no active generation, passthrough");
            return Ok(Interception::Passthrough);
        };

        FetchInterceptor::new(self.manager.executor(active)).handle(request).await
    }

    /// Handle a control message.
    pub async fn on_message(&self, message: ControlMessage) -> Result<MessageOutcome, Error> {
        tracing::info!(?message, "control message received");

        match message {
            ControlMessage::SkipWaiting => {
                if self.manager.waiting().await.is_none() {
                    return Ok(MessageOutcome::NothingWaiting);
                }
                self.on_activate().await.map(MessageOutcome::Activated)
            }
            ControlMessage::RefreshCache => {
                let previous = self.enter(WorkerState::Installing).await?;
                match self.manager.refresh().await {
                    Ok(report) => {
                        self.set(WorkerState::Activated).await;
                        Ok(MessageOutcome::Refreshed(report))
                    }
                    Err(e) => {
                        self.set(previous).await;
                        Err(e)
                    }
                }
            }
        }
    }
}
