//! SQL Gateway MCP Server
//!
//! Serves read-only schema introspection and SELECT queries over one SQLite
//! database on stdio.

use std::path::PathBuf;

use clap::Parser;
use sql_gateway_mcp::{GatewayConfig, SqlGatewayServer};

#[derive(Parser)]
#[command(name = "sql-gateway-mcp")]
#[command(about = "Read-only SQL gateway MCP server", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $SQL_GATEWAY_CONFIG, then ~/.binks/sql-gateway.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides database.path from the config
    #[arg(short, long, env = "SQL_GATEWAY_DATABASE")]
    database: Option<PathBuf>,
}

async fn build_server() -> anyhow::Result<SqlGatewayServer> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    SqlGatewayServer::from_config(&config).await
}

mcp_common::serve_stdio!(build_server().await?, "sql_gateway_mcp");
