//! Tool handler implementations
//!
//! Shared by the rmcp tool router and the in-process [`EmbeddableMcp`] path,
//! so both answer with identical payloads.
//!
//! [`EmbeddableMcp`]: mcp_common::EmbeddableMcp

use mcp_common::{json_failure, json_success, CallToolResult, McpResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::gateway::Gateway;
use crate::params::{RunQueryParams, TableParams};
use crate::types::GatewayError;

/// Turn a gateway outcome into a tool result
///
/// Gateway failures are tool errors carrying an `ErrorPayload`, never
/// protocol errors.
fn respond<T: Serialize>(tool: &str, outcome: Result<T, GatewayError>) -> McpResult<CallToolResult> {
    match outcome {
        Ok(data) => json_success(&data),
        Err(err) => {
            match &err {
                GatewayError::Internal(detail) => {
                    tracing::error!(tool, error = %detail, "Tool failed")
                }
                other => tracing::debug!(tool, reason = ?other.reason(), "Tool returned failure"),
            }
            json_failure(&err.to_payload())
        }
    }
}

pub async fn list_tables(gateway: &Gateway) -> McpResult<CallToolResult> {
    respond("list_tables", gateway.get_tables_schema().await)
}

pub async fn describe_table(gateway: &Gateway, params: TableParams) -> McpResult<CallToolResult> {
    respond("describe_table", gateway.get_table_schema(&params.table).await)
}

pub async fn run_query(
    gateway: &Gateway,
    params: RunQueryParams,
    cancel: CancellationToken,
) -> McpResult<CallToolResult> {
    respond("run_query", gateway.run_query(&params.sql, &cancel).await)
}

pub async fn count_rows(
    gateway: &Gateway,
    params: TableParams,
    cancel: CancellationToken,
) -> McpResult<CallToolResult> {
    respond("count_rows", gateway.count_rows(&params.table, &cancel).await)
}
