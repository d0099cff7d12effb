//! Query executor
//!
//! Runs a [`ValidatedQuery`] on a pooled read-only handle and collects the
//! rows under row and byte limits. The executor does not validate anything
//! itself; the `ValidatedQuery` type is the proof that the facade did.
//!
//! Work happens on the blocking pool. While it runs, the caller's
//! cancellation token and the per-call timeout are watched, and either one
//! interrupts the statement inside SQLite.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::pool::ConnectionPool;
use crate::storage::{RowSink, StorageHandle, StorageProvider};
use crate::types::{GatewayError, QueryResult, StorageError, Truncation, TruncationReason};
use crate::validator::ValidatedQuery;

/// Rows collected between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Per-call resource limits
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub max_rows: usize,
    /// Approximate serialized size budget for all rows
    pub max_bytes: usize,
    /// `None` disables the timeout
    pub timeout: Option<Duration>,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            max_bytes: 1024 * 1024,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Executes validated statements against pooled handles
pub struct QueryExecutor<P: StorageProvider> {
    pool: ConnectionPool<P>,
    limits: QueryLimits,
}

impl<P: StorageProvider> QueryExecutor<P> {
    pub fn new(pool: ConnectionPool<P>, limits: QueryLimits) -> Self {
        Self { pool, limits }
    }

    /// Run `query` and collect its result.
    ///
    /// Returns `Cancelled` if `cancel` fires and `Timeout` if the configured
    /// timeout elapses; store failures come back as `Execution` with the
    /// store's own message.
    pub async fn execute(
        &self,
        query: &ValidatedQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let limits = self.limits;
        let timed_out = || GatewayError::Timeout(limits.timeout.unwrap_or_default());

        // The timeout covers the wait for a handle as well as the query
        let deadline = deadline(limits.timeout);
        tokio::pin!(deadline);

        let mut handle = tokio::select! {
            acquired = self.pool.acquire() => acquired?,
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            _ = &mut deadline => return Err(timed_out()),
        };
        let interrupt = handle.interrupt_handle();
        let statement = query.as_str().to_owned();

        // Child token lets a timeout stop the row loop without touching the caller's token
        let stop = cancel.child_token();
        let worker_stop = stop.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let mut collector = RowCollector::new(limits, worker_stop);
            let outcome = handle.query(&statement, &mut collector);
            if matches!(outcome, Err(StorageError::Unavailable(_))) {
                handle.discard();
            }
            // Handed back so it cannot be reused before a pending interrupt lands
            (collector, outcome, handle)
        });

        let interrupted_by = tokio::select! {
            joined = &mut task => {
                let (collector, outcome, _handle) = joined
                    .map_err(|e| GatewayError::Internal(format!("query task failed: {}", e)))?;
                return finish(collector, outcome);
            }
            _ = cancel.cancelled() => GatewayError::Cancelled,
            _ = &mut deadline => timed_out(),
        };

        stop.cancel();
        interrupt.interrupt();
        // Wait for the worker so its handle is back in the pool before returning
        match task.await {
            Ok((_, _, handle)) => drop(handle),
            Err(e) => tracing::error!(error = %e, "Query task failed after interrupt"),
        }
        Err(interrupted_by)
    }
}

/// Resolves once `timeout` has elapsed; never, without one
pub(crate) async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn finish(collector: RowCollector, outcome: Result<(), StorageError>) -> Result<QueryResult, GatewayError> {
    match outcome {
        Ok(()) if collector.cancelled => Err(GatewayError::Cancelled),
        Ok(()) => Ok(collector.into_result()),
        Err(StorageError::Interrupted) => Err(GatewayError::Cancelled),
        Err(e) => Err(e.into()),
    }
}

/// Sink that enforces the row and byte limits
struct RowCollector {
    limits: QueryLimits,
    stop: CancellationToken,
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
    bytes: usize,
    truncated: Option<Truncation>,
    cancelled: bool,
}

impl RowCollector {
    fn new(limits: QueryLimits, stop: CancellationToken) -> Self {
        Self {
            limits,
            stop,
            columns: Vec::new(),
            rows: Vec::new(),
            bytes: 0,
            truncated: None,
            cancelled: false,
        }
    }

    fn truncate(&mut self, reason: TruncationReason, limit: usize) -> ControlFlow<()> {
        self.truncated = Some(Truncation { reason, limit });
        ControlFlow::Break(())
    }

    fn into_result(self) -> QueryResult {
        QueryResult {
            row_count: self.rows.len(),
            columns: self.columns,
            rows: self.rows,
            truncated: self.truncated,
        }
    }
}

impl RowSink for RowCollector {
    fn begin(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    fn accept(&mut self, row: Vec<serde_json::Value>) -> ControlFlow<()> {
        if self.rows.len() % CANCEL_CHECK_INTERVAL == 0 && self.stop.is_cancelled() {
            self.cancelled = true;
            return ControlFlow::Break(());
        }

        if self.rows.len() >= self.limits.max_rows {
            return self.truncate(TruncationReason::RowLimit, self.limits.max_rows);
        }

        let row_bytes = estimated_size(&row);
        if self.bytes + row_bytes > self.limits.max_bytes {
            return self.truncate(TruncationReason::ByteBudget, self.limits.max_bytes);
        }

        self.bytes += row_bytes;
        self.rows.push(row);
        ControlFlow::Continue(())
    }
}

/// Rough JSON size of a row, without serializing it
fn estimated_size(row: &[serde_json::Value]) -> usize {
    row.iter()
        .map(|value| match value {
            serde_json::Value::Null => 4,
            serde_json::Value::Bool(_) => 5,
            serde_json::Value::Number(n) => n.to_string().len(),
            serde_json::Value::String(s) => s.len() + 2,
            other => other.to_string().len(),
        })
        .sum::<usize>()
        + row.len()
        + 1
}
