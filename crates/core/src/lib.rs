//! Core of the shellcache offline caching engine.
//!
//! This crate provides:
//! - Manifest model, loader and fallback
//! - Precache set computation and cache-key normalization
//! - Fetch strategies and runtime-cache qualification
//! - Cache generation lifecycle over a SQLite store
//! - Fetch interception and the worker event surface
//! - Unified error types and configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod interceptor;
pub mod keys;
pub mod manifest;
pub mod network;
pub mod precache;
pub mod runtime;
pub mod strategy;
pub mod worker;

pub use cache::{CacheDb, CachedEntry, GenerationInfo};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use generation::{ActivateReport, ActiveManifest, GenerationManager, InstallReport, RefreshReport};
pub use interceptor::{FetchInterceptor, Interception, RequestClass};
pub use manifest::{Manifest, ManifestLoader, Strategy};
pub use network::{MemoryNetwork, Network, NetworkError, Request, RequestMode, Response};
pub use strategy::{ResponseSource, Served, StrategyExecutor};
pub use worker::{ControlMessage, InstallOutcome, MessageOutcome, ServiceWorker, WorkerOptions, WorkerState};
