//! In-process execution of MCP servers
//!
//! [`EmbeddableMcp`] lets a host (or a test) call a server's tools directly,
//! without a transport in between. Each call carries a [`CancellationToken`]
//! standing in for the protocol's cancellation notification.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Error type for embeddable MCP operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Parameters did not deserialize into the tool's argument type
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    /// The server failed to produce a response at all
    #[error("mcp error: {0}")]
    McpError(String),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::McpError(err.message.to_string())
    }
}

pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// An MCP server callable in-process
///
/// Tool-level failures come back as `Ok` results flagged `is_error`, exactly
/// as they would over the wire; `Err` is reserved for unknown tools, bad
/// parameters and server faults.
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Name used in MCP configuration files
    fn server_name(&self) -> &str;

    /// Every tool with its name, description and input schema
    fn list_tools(&self) -> Vec<Tool>;

    /// Run tool `name` with JSON `params`
    ///
    /// Cancelling `cancel` aborts a long-running call; the call then returns
    /// a cancellation failure instead of a result.
    async fn call_tool(
        &self,
        name: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }

    fn server_version(&self) -> Option<&str> {
        None
    }
}
