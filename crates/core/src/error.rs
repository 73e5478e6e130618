//! Unified error types for shellcache.
//!
//! The codes in the display strings are stable and surface unchanged in
//! MCP tool errors.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the caching engine and its host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A path or URL could not be resolved against the worker scope.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Manifest JSON parsed but failed validation.
    #[error("INVALID_MANIFEST: {0}")]
    InvalidManifest(String),

    /// The remote manifest could not be loaded.
    ///
    /// Recovered inside the loader by substituting the fallback manifest.
    #[error("MANIFEST_UNAVAILABLE: {0}")]
    ManifestUnavailable(String),

    /// One or more precache fetches failed; nothing was committed.
    #[error("PARTIAL_INSTALL_FAILURE: {} asset(s) failed: {}", failed.len(), failed.join(", "))]
    PartialInstallFailure { failed: Vec<String> },

    /// Live fetch failed and no usable cache entry exists.
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// No cache generation has been installed or activated yet.
    #[error("NO_ACTIVE_GENERATION: {0}")]
    NoActiveGeneration(String),

    /// A lifecycle event arrived in a state that cannot accept it.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let code = match &err {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => -32602,
            Error::InvalidManifest(_) | Error::ManifestUnavailable(_) => -32003,
            Error::PartialInstallFailure { .. } => -32004,
            Error::NetworkUnavailable(_) => -32005,
            Error::NoActiveGeneration(_) => -32006,
            Error::InvalidState(_) => -32007,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Serialization(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
