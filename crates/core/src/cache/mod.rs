//! SQLite-backed storage for cache generations.
//!
//! This module provides the persistent named-cache store the worker reads
//! and writes, using SQLite with async access via tokio-rusqlite. It
//! supports:
//!
//! - Named generations with cascading deletes
//! - Upsert semantics per (generation, key)
//! - All-or-nothing bulk population
//! - Query-insensitive matching
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod generations;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CachedEntry, EntryOrigin, PopulateMode};
pub use generations::GenerationInfo;
