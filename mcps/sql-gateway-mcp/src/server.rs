//! SQL gateway MCP server

use std::sync::Arc;

use anyhow::Context;
use mcp_common::{
    async_trait, CallToolResult, EmbeddableError, EmbeddableMcp, EmbeddableResult, McpError, Tool,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        ListResourcesResult, PaginatedRequestParam, ReadResourceRequestParam, ReadResourceResult,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router, RoleServer,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::handlers;
use crate::params::{RunQueryParams, TableParams};
use crate::resources;

/// MCP front end for a read-only [`Gateway`]
#[derive(Clone)]
pub struct SqlGatewayServer {
    gateway: Arc<Gateway>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SqlGatewayServer {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            tool_router: Self::tool_router(),
        }
    }

    /// Open the configured database and wrap it in a server
    pub async fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let gateway = Gateway::open(config)
            .await
            .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
        Ok(Self::new(gateway))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[tool(description = "List every user table in the database with its columns, in declaration order. Use this first to learn the schema before writing queries.")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        handlers::list_tables(&self.gateway).await
    }

    #[tool(description = "Describe one table by exact, case-sensitive name: its columns (name, type, nullable, primary_key, default_value) and CREATE TABLE statement.")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_table(&self.gateway, params).await
    }

    #[tool(description = "Run a single read-only SELECT statement and return columns and rows. Statements that modify data or schema are rejected with a reason code. Large results are truncated and flagged.")]
    async fn run_query(
        &self,
        Parameters(params): Parameters<RunQueryParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        handlers::run_query(&self.gateway, params, context.ct).await
    }

    #[tool(description = "Count the rows of one table, given its exact name.")]
    async fn count_rows(
        &self,
        Parameters(params): Parameters<TableParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        handlers::count_rows(&self.gateway, params, context.ct).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SqlGatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only SQL gateway over a SQLite database. \
                Call list_tables to see the schema, describe_table for one table's details, \
                run_query to execute a single SELECT statement and count_rows for table sizes. \
                The schema is also readable as resources: schema://tables and schema://table/<name>. \
                Failures come back as JSON with a reason code and message."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = resources::list(&self.gateway).await?;
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        resources::read(&self.gateway, &request.uri).await
    }
}

#[async_trait]
impl EmbeddableMcp for SqlGatewayServer {
    fn server_name(&self) -> &str {
        "sql-gateway"
    }

    fn server_description(&self) -> Option<&str> {
        Some("Read-only schema introspection and SELECT queries over SQLite")
    }

    fn server_version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(
        &self,
        name: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> EmbeddableResult<CallToolResult> {
        let result = match name {
            "list_tables" => handlers::list_tables(&self.gateway).await?,
            "describe_table" => {
                let params: TableParams = serde_json::from_value(params)?;
                handlers::describe_table(&self.gateway, params).await?
            }
            "run_query" => {
                let params: RunQueryParams = serde_json::from_value(params)?;
                handlers::run_query(&self.gateway, params, cancel).await?
            }
            "count_rows" => {
                let params: TableParams = serde_json::from_value(params)?;
                handlers::count_rows(&self.gateway, params, cancel).await?
            }
            _ => return Err(EmbeddableError::ToolNotFound(name.to_string())),
        };
        Ok(result)
    }
}
