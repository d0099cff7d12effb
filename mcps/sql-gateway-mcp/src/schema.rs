//! Schema introspection with a version-checked cache
//!
//! Reads the store's catalog into [`TableSchema`] snapshots. The last
//! snapshot is kept and reused while the store's schema version is unchanged
//! and the entry is younger than the configured TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::storage::StorageHandle;
use crate::types::{GatewayError, TableDescription, TableSchema};

struct CachedSchema {
    version: i64,
    fetched_at: Instant,
    tables: Arc<Vec<TableSchema>>,
}

/// Builds table schemas from store metadata
pub struct SchemaIntrospector {
    ttl: Duration,
    cache: Mutex<Option<CachedSchema>>,
}

impl SchemaIntrospector {
    /// `ttl` of zero turns caching off
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Every user table with its columns, in catalog order
    pub fn list_tables<H: StorageHandle + ?Sized>(
        &self,
        handle: &H,
    ) -> Result<Arc<Vec<TableSchema>>, GatewayError> {
        let version = handle.schema_version()?;

        if let Some(tables) = self.cached(version) {
            tracing::debug!(version, "Schema cache hit");
            return Ok(tables);
        }

        tracing::debug!(version, "Schema cache miss, reading catalog");
        let tables = Arc::new(read_catalog(handle)?);

        if !self.ttl.is_zero() {
            *self.cache.lock() = Some(CachedSchema {
                version,
                fetched_at: Instant::now(),
                tables: Arc::clone(&tables),
            });
        }
        Ok(tables)
    }

    /// One table by exact, case-sensitive name
    pub fn describe_table<H: StorageHandle + ?Sized>(
        &self,
        handle: &H,
        name: &str,
    ) -> Result<TableSchema, GatewayError> {
        let tables = self.list_tables(handle)?;
        tables
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    /// [`describe_table`](Self::describe_table) plus the table's DDL
    pub fn describe_table_with_sql<H: StorageHandle + ?Sized>(
        &self,
        handle: &H,
        name: &str,
    ) -> Result<TableDescription, GatewayError> {
        let schema = self.describe_table(handle, name)?;
        let sql = handle.table_definition(name)?;
        Ok(TableDescription { schema, sql })
    }

    fn cached(&self, version: i64) -> Option<Arc<Vec<TableSchema>>> {
        let mut cache = self.cache.lock();
        let entry = cache.as_ref()?;
        if entry.version == version && entry.fetched_at.elapsed() < self.ttl {
            return Some(Arc::clone(&entry.tables));
        }
        // Stale or from an older schema generation
        *cache = None;
        None
    }
}

fn read_catalog<H: StorageHandle + ?Sized>(handle: &H) -> Result<Vec<TableSchema>, GatewayError> {
    let names = handle.list_user_tables()?;
    let mut tables = Vec::with_capacity(names.len());

    for name in names {
        let columns = handle.describe_columns(&name)?;
        match TableSchema::new(name.as_str(), columns) {
            Some(table) => tables.push(table),
            None => tracing::warn!(table = %name, "Table reported no columns, skipping"),
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteProvider, StorageProvider};
    use crate::types::ReasonCode;
    use rusqlite::Connection;
    use tempfile::{tempdir, TempDir};

    fn fixture() -> (TempDir, SqliteProvider) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE Artist (
                    ArtistId INTEGER PRIMARY KEY NOT NULL,
                    Name NVARCHAR(120)
                );
                CREATE TABLE Album (
                    AlbumId INTEGER PRIMARY KEY NOT NULL,
                    Title NVARCHAR(160) NOT NULL,
                    ArtistId INTEGER NOT NULL,
                    FOREIGN KEY (ArtistId) REFERENCES Artist (ArtistId)
                );
                "#,
            )
            .unwrap();
        (dir, SqliteProvider::new(path, Duration::from_millis(100)))
    }

    #[test]
    fn test_lists_tables_with_ordered_columns() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::ZERO);

        let tables = introspector.list_tables(&handle).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Artist", "Album"]);

        let album: Vec<_> = tables[1].columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(album, vec!["AlbumId", "Title", "ArtistId"]);
    }

    #[test]
    fn test_describe_is_case_sensitive() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::ZERO);

        assert!(introspector.describe_table(&handle, "Artist").is_ok());
        let err = introspector.describe_table(&handle, "artist").unwrap_err();
        assert_eq!(err.reason(), ReasonCode::NotFound);
    }

    #[test]
    fn test_describe_unknown_table() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::from_secs(60));

        match introspector.describe_table(&handle, "NoSuchTable") {
            Err(GatewayError::NotFound(name)) => assert_eq!(name, "NoSuchTable"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_describe_with_sql() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::ZERO);

        let description = introspector.describe_table_with_sql(&handle, "Album").unwrap();
        assert_eq!(description.schema.name(), "Album");
        assert!(description.sql.unwrap().contains("REFERENCES Artist"));
    }

    #[test]
    fn test_cache_reused_within_ttl() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::from_secs(60));

        let first = introspector.list_tables(&handle).unwrap();
        let second = introspector.list_tables(&handle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_disabled_with_zero_ttl() {
        let (_dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::ZERO);

        let first = introspector.list_tables(&handle).unwrap();
        let second = introspector.list_tables(&handle).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_invalidated_by_schema_change() {
        let (dir, provider) = fixture();
        let handle = provider.connect().unwrap();
        let introspector = SchemaIntrospector::new(Duration::from_secs(60));

        assert_eq!(introspector.list_tables(&handle).unwrap().len(), 2);

        Connection::open(dir.path().join("schema.db"))
            .unwrap()
            .execute_batch("CREATE TABLE Genre (GenreId INTEGER PRIMARY KEY, Name TEXT)")
            .unwrap();

        let tables = introspector.list_tables(&handle).unwrap();
        assert_eq!(tables.len(), 3);
        assert!(introspector.describe_table(&handle, "Genre").is_ok());
    }
}
