//! Structured errors for the shellcache server.
//!
//! Engine failures convert straight from `shellcache_core::Error`; these
//! cover what only the tool layer can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Tool-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No entry under the requested key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Tool output could not be encoded.
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::CacheMiss(_) => -32001,
            ToolError::Serialization(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: McpError = ToolError::InvalidInput("bad".into()).into();
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "INVALID_INPUT: bad");

        let err: McpError = ToolError::CacheMiss("./a.css".into()).into();
        assert_eq!(err.code, ErrorCode(-32001));
    }
}
