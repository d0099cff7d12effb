//! Result helpers for MCP tool responses
//!
//! Tools answer with JSON either way. Success goes out as a normal result;
//! a domain failure goes out as a result flagged `is_error` whose body is
//! the structured error payload, so the client can read the reason code.
//! Transport-level `McpError`s are left for failures of the server itself.

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::{McpResult, ResultExt};

fn to_json<T: Serialize>(data: &T) -> McpResult<String> {
    serde_json::to_string_pretty(data).to_mcp_err()
}

/// Successful response carrying pretty-printed JSON
///
/// ```rust,ignore
/// use mcp_common::json_success;
///
/// async fn list_things(&self) -> McpResult<CallToolResult> {
///     json_success(&self.things())
/// }
/// ```
pub fn json_success<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    Ok(CallToolResult::success(vec![Content::text(to_json(data)?)]))
}

/// Error response (`is_error = true`) carrying a JSON payload
///
/// Use for failures the client caused or can act on, e.g. a rejected
/// request with a reason code.
pub fn json_failure<T: Serialize>(payload: &T) -> McpResult<CallToolResult> {
    Ok(CallToolResult::error(vec![Content::text(to_json(payload)?)]))
}
