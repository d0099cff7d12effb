//! SQL Gateway MCP Library
//!
//! Read-only access to a SQLite database for language-model clients:
//! schema introspection plus single-statement SELECT queries. Every query
//! passes a lexical validator before it reaches the database, and the
//! connection itself is opened read-only.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use sql_gateway_mcp::{Gateway, GatewayConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let gateway = Gateway::open(&GatewayConfig::with_database("Chinook.db")).await?;
//! let result = gateway
//!     .run_query("SELECT Name FROM Artist LIMIT 5", &CancellationToken::new())
//!     .await?;
//! ```

pub mod config;
pub mod escape;
pub mod executor;
pub mod gateway;
pub mod handlers;
pub mod params;
pub mod pool;
pub mod resources;
pub mod schema;
pub mod server;
pub mod storage;
pub mod types;
pub mod validator;

pub use config::GatewayConfig;
pub use gateway::{Gateway, SchemaMap};
pub use server::SqlGatewayServer;
pub use types::{
    ColumnSchema, ErrorPayload, GatewayError, QueryResult, ReasonCode, RowCount, TableDescription,
    TableSchema,
};
pub use validator::{QueryValidator, QueryVerdict, ValidatedQuery};

pub use params::{RunQueryParams, TableParams};
