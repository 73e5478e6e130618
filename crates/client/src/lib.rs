//! HTTP client for shellcache.
//!
//! This crate provides the reqwest-backed [`HttpNetwork`], the live side of
//! the engine's `Network` seam used by the server.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork};
