//! Shared plumbing for MCP servers
//!
//! - `serve_stdio!` and [`init_tracing`] for startup
//! - [`json_success`] / [`json_failure`] for tool responses
//! - [`ResultExt`] for turning library errors into [`McpError`]
//! - [`EmbeddableMcp`] for calling a server in-process
//!
//! ```rust,ignore
//! use mcp_common::{json_failure, json_success, McpResult};
//!
//! async fn describe(&self, name: &str) -> McpResult<CallToolResult> {
//!     match self.lookup(name) {
//!         Ok(table) => json_success(&table),
//!         Err(err) => json_failure(&err.to_payload()),
//!     }
//! }
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;

pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{IntoMcpError, McpResult, ResultExt};
pub use init::init_tracing;
pub use result::{json_failure, json_success};

pub use rmcp::{
    model::{CallToolResult, Content, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
