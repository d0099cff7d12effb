//! Error handling utilities for MCP servers

use rmcp::ErrorData as McpError;

/// Type alias for MCP tool results
pub type McpResult<T> = Result<T, McpError>;

/// Conversion into a transport-level MCP error
///
/// Implemented for the error types servers hit while building responses, so
/// `?` works after [`ResultExt::to_mcp_err`].
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("JSON error: {}", self), None)
    }
}

/// Extension trait for Result types to convert to MCP errors
///
/// ```rust,ignore
/// use mcp_common::ResultExt;
///
/// let json = serde_json::to_string(&data).to_mcp_err()?;
/// ```
pub trait ResultExt<T> {
    fn to_mcp_err(self) -> McpResult<T>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> McpResult<T> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ext_json() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err = result.to_mcp_err().unwrap_err();
        assert!(err.message.contains("JSON error"));
    }
}
