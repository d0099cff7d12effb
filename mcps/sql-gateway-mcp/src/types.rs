//! Type definitions for the SQL gateway

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Schema Types
// ============================================================================

/// One column of a table, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Type as declared in the DDL (e.g. "INTEGER", "NVARCHAR(120)"), empty if none was declared
    #[serde(rename = "type")]
    pub declared_type: String,
    /// `None` when the store does not report nullability
    pub nullable: Option<bool>,
    /// `None` when the store does not report key membership
    pub primary_key: Option<bool>,
    /// Default value expression as written in the DDL
    pub default_value: Option<String>,
}

/// Snapshot of a table's structure. Always has at least one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Build a schema, refusing a column-less table
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Option<Self> {
        if columns.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }
}

/// Table description returned by `describe_table`
#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    #[serde(flatten)]
    pub schema: TableSchema,
    /// `CREATE TABLE` statement, when the store keeps one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

// ============================================================================
// Query Result Types
// ============================================================================

/// Why a result set was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    RowLimit,
    ByteBudget,
}

/// Marker attached to a result that hit a configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Truncation {
    pub reason: TruncationReason,
    /// The limit that was hit (rows or bytes, depending on `reason`)
    pub limit: usize,
}

/// Tabular query output
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
}

/// Output of `count_rows`
#[derive(Debug, Clone, Serialize)]
pub struct RowCount {
    pub table: String,
    pub row_count: i64,
}

// ============================================================================
// Error Types
// ============================================================================

/// Machine-readable reason attached to every failure the gateway reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    Empty,
    NotASelect,
    MultipleStatements,
    ForbiddenKeyword,
    Unterminated,
    NotFound,
    Timeout,
    Cancelled,
    ExecutionError,
    Internal,
}

/// A validator rejection: reason plus a message for humans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: ReasonCode,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Structured error body sent back to MCP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub reason: ReasonCode,
    pub message: String,
}

/// Failures reported by a storage provider
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store refused or failed the statement itself
    #[error("{0}")]
    Query(String),

    /// The statement was stopped through the interrupt handle
    #[error("query interrupted")]
    Interrupted,

    /// The store could not be reached or the handle is broken
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::OperationInterrupted) => StorageError::Interrupted,
            Some(
                rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::NotADatabase
                | rusqlite::ErrorCode::SystemIoFailure
                | rusqlite::ErrorCode::DatabaseCorrupt
                | rusqlite::ErrorCode::OutOfMemory,
            ) => StorageError::Unavailable(err.to_string()),
            _ => StorageError::Query(err.to_string()),
        }
    }
}

/// Every outcome a gateway operation can fail with
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{}", .0.message)]
    Rejected(Rejection),

    #[error("Table '{0}' not found")]
    NotFound(String),

    /// Store message, passed through unmodified
    #[error("{0}")]
    Execution(String),

    #[error("Query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            GatewayError::Rejected(rejection) => rejection.reason,
            GatewayError::NotFound(_) => ReasonCode::NotFound,
            GatewayError::Execution(_) => ReasonCode::ExecutionError,
            GatewayError::Timeout(_) => ReasonCode::Timeout,
            GatewayError::Cancelled => ReasonCode::Cancelled,
            GatewayError::Internal(_) => ReasonCode::Internal,
        }
    }

    /// Payload for the client. Internal details stay in the server log.
    pub fn to_payload(&self) -> ErrorPayload {
        let message = match self {
            GatewayError::Internal(_) => "Internal gateway error; see server logs".to_string(),
            other => other.to_string(),
        };
        ErrorPayload {
            reason: self.reason(),
            message,
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(message) => GatewayError::Execution(message),
            StorageError::Interrupted => GatewayError::Cancelled,
            StorageError::Unavailable(message) => GatewayError::Internal(message),
        }
    }
}
