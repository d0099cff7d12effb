//! Gateway facade
//!
//! The three client operations (list schema, describe a table, run a query)
//! plus `count_rows`. Every statement that reaches the executor has been
//! through the validator, including the ones the gateway writes itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::escape::escape_identifier;
use crate::executor::{deadline, QueryExecutor, QueryLimits};
use crate::pool::ConnectionPool;
use crate::schema::SchemaIntrospector;
use crate::storage::{SqliteProvider, StorageProvider};
use crate::types::{ColumnSchema, GatewayError, QueryResult, RowCount, TableDescription, TableSchema};
use crate::validator::QueryValidator;

/// Schema set as sent to clients: table name to ordered columns
pub type SchemaMap = BTreeMap<String, Vec<ColumnSchema>>;

/// Read-only database gateway
pub struct Gateway<P: StorageProvider = SqliteProvider> {
    pool: ConnectionPool<P>,
    introspector: Arc<SchemaIntrospector>,
    validator: QueryValidator,
    executor: QueryExecutor<P>,
    /// Bounds the wait for a handle during introspection
    timeout: Option<Duration>,
}

impl Gateway<SqliteProvider> {
    /// Open the SQLite database named by `config`.
    ///
    /// One handle is opened up front so a missing or unreadable file fails here
    /// rather than on the first call.
    pub async fn open(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let provider = SqliteProvider::new(&config.database.path, config.busy_timeout());
        let gateway = Self::new(
            provider,
            config.database.max_connections,
            QueryValidator::with_extra_keywords(&config.validator.extra_forbidden_keywords),
            config.query_limits(),
            SchemaIntrospector::new(config.schema_cache_ttl()),
        );

        drop(gateway.pool.acquire().await?);
        tracing::info!(
            database = %gateway.pool.provider().location(),
            max_connections = gateway.pool.max_size(),
            max_rows = config.limits.max_rows,
            max_bytes = config.limits.max_bytes,
            "Gateway opened"
        );
        Ok(gateway)
    }
}

impl<P: StorageProvider> Gateway<P> {
    pub fn new(
        provider: P,
        max_connections: usize,
        validator: QueryValidator,
        limits: QueryLimits,
        introspector: SchemaIntrospector,
    ) -> Self {
        let pool = ConnectionPool::new(provider, max_connections);
        Self {
            timeout: limits.timeout,
            executor: QueryExecutor::new(pool.clone(), limits),
            pool,
            introspector: Arc::new(introspector),
            validator,
        }
    }

    /// Every user table, in catalog order
    pub async fn list_tables(&self) -> Result<Arc<Vec<TableSchema>>, GatewayError> {
        self.with_introspector(|introspector, handle| introspector.list_tables(handle))
            .await
    }

    /// Every user table keyed by name
    pub async fn get_tables_schema(&self) -> Result<SchemaMap, GatewayError> {
        let tables = self.list_tables().await?;
        Ok(tables
            .iter()
            .map(|t| (t.name().to_string(), t.columns().to_vec()))
            .collect())
    }

    /// One table by exact name, with its DDL; `NotFound` if absent
    pub async fn get_table_schema(&self, name: &str) -> Result<TableDescription, GatewayError> {
        let name = name.to_string();
        self.with_introspector(move |introspector, handle| {
            introspector.describe_table_with_sql(handle, &name)
        })
        .await
    }

    /// Validate `raw` and, if accepted, execute it
    pub async fn run_query(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, GatewayError> {
        let query = self.validator.validate(raw).into_result().map_err(|rejection| {
            tracing::warn!(reason = ?rejection.reason, "Query rejected: {}", rejection.message);
            GatewayError::Rejected(rejection)
        })?;

        tracing::debug!(sql = %query.as_str(), "Executing query");
        let result = self.executor.execute(&query, cancel).await?;
        tracing::debug!(
            rows = result.row_count,
            truncated = result.truncated.is_some(),
            "Query complete"
        );
        Ok(result)
    }

    /// Row count of an existing table
    pub async fn count_rows(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<RowCount, GatewayError> {
        // Resolve first so an unknown name is NotFound, not an execution error
        let schema = self.get_table_schema(table).await?.schema;

        let sql = format!(
            "SELECT COUNT(*) AS row_count FROM {}",
            escape_identifier(schema.name())
        );
        let result = self.run_query(&sql, cancel).await?;

        let row_count = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_i64())
            .ok_or_else(|| GatewayError::Internal(format!("COUNT(*) on '{}' returned no value", table)))?;

        Ok(RowCount {
            table: schema.name().to_string(),
            row_count,
        })
    }

    /// Run introspection on a pooled handle off the async runtime
    async fn with_introspector<T, F>(&self, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&SchemaIntrospector, &P::Handle) -> Result<T, GatewayError> + Send + 'static,
    {
        let mut handle = tokio::select! {
            acquired = self.pool.acquire() => acquired?,
            _ = deadline(self.timeout) => {
                return Err(GatewayError::Timeout(self.timeout.unwrap_or_default()));
            }
        };
        let introspector = Arc::clone(&self.introspector);

        tokio::task::spawn_blocking(move || {
            let outcome = f(&introspector, &handle);
            if matches!(outcome, Err(GatewayError::Internal(_))) {
                handle.discard();
            }
            outcome
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("introspection task failed: {}", e)))?
    }
}
