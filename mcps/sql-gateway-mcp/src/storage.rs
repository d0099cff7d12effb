//! Storage provider - the boundary between the gateway and the database
//!
//! The gateway never opens files or builds connections itself. It asks a
//! [`StorageProvider`] for handles and talks to the store only through
//! [`StorageHandle`]. [`SqliteProvider`] is the rusqlite implementation.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::escape::escape_identifier;
use crate::types::{ColumnSchema, StorageError};

// ============================================================================
// Provider Traits
// ============================================================================

/// Receives a result set one row at a time
pub trait RowSink {
    /// Called once with the result column names before any row
    fn begin(&mut self, columns: Vec<String>);

    /// Called per row; `Break` stops the scan early
    fn accept(&mut self, row: Vec<serde_json::Value>) -> ControlFlow<()>;
}

/// Aborts whatever statement its handle is running
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

impl Interrupt for rusqlite::InterruptHandle {
    fn interrupt(&self) {
        rusqlite::InterruptHandle::interrupt(self)
    }
}

/// An open, read-only handle on the backing store
pub trait StorageHandle: Send + 'static {
    /// User tables in catalog order, internal tables excluded
    fn list_user_tables(&self) -> Result<Vec<String>, StorageError>;

    /// Columns of `table` in declaration order; empty if the table is unknown
    fn describe_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, StorageError>;

    /// DDL text of `table`, if the store keeps it
    fn table_definition(&self, table: &str) -> Result<Option<String>, StorageError>;

    /// Counter that changes whenever the store's schema changes
    fn schema_version(&self) -> Result<i64, StorageError>;

    /// Run `statement` and stream its rows into `sink`
    fn query(&self, statement: &str, sink: &mut dyn RowSink) -> Result<(), StorageError>;

    /// Handle that can stop a running [`StorageHandle::query`] from another thread
    fn interrupt_handle(&self) -> Box<dyn Interrupt>;
}

/// Source of handles on one backing store
pub trait StorageProvider: Send + Sync + 'static {
    type Handle: StorageHandle;

    fn connect(&self) -> Result<Self::Handle, StorageError>;

    /// Human-readable description of the store, for logs
    fn location(&self) -> String;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// Opens read-only rusqlite connections on one database file
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteProvider {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }
}

impl StorageProvider for SqliteProvider {
    type Handle = SqliteHandle;

    fn connect(&self) -> Result<SqliteHandle, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;

        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| {
            StorageError::Unavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // Second line of defence behind the validator
        conn.pragma_update(None, "query_only", true)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(SqliteHandle { conn })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// One read-only SQLite connection
pub struct SqliteHandle {
    conn: Connection,
}

impl StorageHandle for SqliteHandle {
    fn list_user_tables(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn describe_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", escape_identifier(table)))?;

        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get("name")?,
                    declared_type: row.get::<_, Option<String>>("type")?.unwrap_or_default(),
                    nullable: row.get::<_, Option<i64>>("notnull")?.map(|n| n == 0),
                    primary_key: row.get::<_, Option<i64>>("pk")?.map(|pk| pk != 0),
                    default_value: row.get("dflt_value")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    fn table_definition(&self, table: &str) -> Result<Option<String>, StorageError> {
        let sql = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(sql.flatten())
    }

    fn schema_version(&self) -> Result<i64, StorageError> {
        let version = self
            .conn
            .query_row("PRAGMA schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn query(&self, statement: &str, sink: &mut dyn RowSink) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = columns.len();
        sink.begin(columns);

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(json_value(row.get_ref(i)?));
            }
            if sink.accept(values).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn interrupt_handle(&self) -> Box<dyn Interrupt> {
        Box::new(self.conn.get_interrupt_handle())
    }
}

/// Map a SQLite value onto JSON. Blobs are summarised, not transferred.
fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::json!(f),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    struct Collect {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        stop_after: Option<usize>,
    }

    impl RowSink for Collect {
        fn begin(&mut self, columns: Vec<String>) {
            self.columns = columns;
        }

        fn accept(&mut self, row: Vec<serde_json::Value>) -> ControlFlow<()> {
            self.rows.push(row);
            match self.stop_after {
                Some(n) if self.rows.len() >= n => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    fn collector(stop_after: Option<usize>) -> Collect {
        Collect {
            columns: Vec::new(),
            rows: Vec::new(),
            stop_after,
        }
    }

    fn fixture() -> (TempDir, SqliteProvider) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Genre" (
                GenreId INTEGER PRIMARY KEY NOT NULL,
                Name NVARCHAR(120),
                Rating REAL DEFAULT 2.5,
                Cover BLOB
            );
            CREATE TABLE "odd ""name""" (x);
            CREATE INDEX idx_genre_name ON Genre(Name);
            INSERT INTO Genre VALUES (1, 'Rock', 4.5, x'0102');
            INSERT INTO Genre VALUES (2, 'Jazz', NULL, NULL);
            INSERT INTO Genre VALUES (3, NULL, 1.0, NULL);
            "#,
        )
        .unwrap();
        let provider = SqliteProvider::new(path, Duration::from_millis(100));
        (dir, provider)
    }

    #[test]
    fn test_lists_user_tables_only() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let tables = handle.list_user_tables().unwrap();
        assert_eq!(tables, vec!["Genre".to_string(), "odd \"name\"".to_string()]);
    }

    #[test]
    fn test_describe_columns_in_order() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let columns = handle.describe_columns("Genre").unwrap();

        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["GenreId", "Name", "Rating", "Cover"]);
        assert_eq!(columns[0].declared_type, "INTEGER");
        assert_eq!(columns[0].primary_key, Some(true));
        assert_eq!(columns[0].nullable, Some(false));
        assert_eq!(columns[1].declared_type, "NVARCHAR(120)");
        assert_eq!(columns[1].nullable, Some(true));
        assert_eq!(columns[2].default_value.as_deref(), Some("2.5"));
    }

    #[test]
    fn test_describe_columns_with_quoted_name() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let columns = handle.describe_columns("odd \"name\"").unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].declared_type, "");
    }

    #[test]
    fn test_describe_unknown_table_is_empty() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        assert!(handle.describe_columns("Nope").unwrap().is_empty());
        assert!(handle.table_definition("Nope").unwrap().is_none());
    }

    #[test]
    fn test_table_definition() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let sql = handle.table_definition("Genre").unwrap().unwrap();
        assert!(sql.starts_with("CREATE TABLE"));
    }

    #[test]
    fn test_query_streams_values() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let mut sink = collector(None);
        handle
            .query("SELECT GenreId, Name, Rating, Cover FROM Genre ORDER BY GenreId", &mut sink)
            .unwrap();

        assert_eq!(sink.columns, vec!["GenreId", "Name", "Rating", "Cover"]);
        assert_eq!(sink.rows.len(), 3);
        assert_eq!(sink.rows[0][0], serde_json::json!(1));
        assert_eq!(sink.rows[0][1], serde_json::json!("Rock"));
        assert_eq!(sink.rows[0][2], serde_json::json!(4.5));
        assert_eq!(sink.rows[0][3], serde_json::json!("<blob 2 bytes>"));
        assert_eq!(sink.rows[2][1], serde_json::Value::Null);
    }

    #[test]
    fn test_query_stops_when_sink_breaks() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let mut sink = collector(Some(1));
        handle.query("SELECT * FROM Genre", &mut sink).unwrap();
        assert_eq!(sink.rows.len(), 1);
    }

    #[test]
    fn test_writes_rejected_by_store() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let mut sink = collector(None);
        let err = handle
            .query("INSERT INTO Genre (GenreId, Name) VALUES (9, 'Polka')", &mut sink)
            .unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));

        let mut sink = collector(None);
        handle.query("SELECT COUNT(*) FROM Genre", &mut sink).unwrap();
        assert_eq!(sink.rows[0][0], serde_json::json!(3));
    }

    #[test]
    fn test_bad_statement_is_query_error() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let mut sink = collector(None);
        let err = handle.query("SELECT nope FROM Genre", &mut sink).unwrap_err();
        match err {
            StorageError::Query(message) => assert!(message.contains("nope")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let provider = SqliteProvider::new(dir.path().join("absent.db"), Duration::ZERO);
        assert!(matches!(provider.connect(), Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn test_schema_version_tracks_ddl() {
        let (dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let before = handle.schema_version().unwrap();

        let writer = Connection::open(dir.path().join("store.db")).unwrap();
        writer.execute_batch("CREATE TABLE Extra (id INTEGER)").unwrap();

        let after = handle.schema_version().unwrap();
        assert_ne!(before, after);
    }
}
