//! Configuration for the SQL gateway

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::executor::QueryLimits;

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SQL_GATEWAY_CONFIG";

/// SQL gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Result size limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Schema cache settings
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Query policy settings
    #[serde(default)]
    pub validator: ValidatorConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum query execution time in seconds, 0 for no limit
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long to wait on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Connections open at once; also the number of queries run concurrently
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Approximate JSON size budget per result, in bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Seconds a schema snapshot may be reused, 0 disables caching
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorConfig {
    /// Keywords rejected in addition to the built-in denylist
    #[serde(default)]
    pub extra_forbidden_keywords: Vec<String>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("Chinook.db")
}

fn default_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_max_connections() -> usize {
    4
}

fn default_max_rows() -> usize {
    1000
}

fn default_max_bytes() -> usize {
    1024 * 1024 // 1MB
}

fn default_cache_ttl() -> u64 {
    60
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            timeout_secs: default_timeout(),
            busy_timeout_ms: default_busy_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration
    ///
    /// Looks for config in:
    /// 1. `explicit` (the `--config` flag)
    /// 2. `SQL_GATEWAY_CONFIG` environment variable
    /// 3. `~/.binks/sql-gateway.toml`
    ///
    /// A file named by 1 or 2 must exist. A missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let Some(home) = dirs::home_dir() else {
            tracing::info!("No home directory, using default configuration");
            return Ok(Self::default());
        };

        let default_path = home.join(".binks").join("sql-gateway.toml");
        if !default_path.exists() {
            tracing::info!("No config at {:?}, using default configuration", default_path);
            return Ok(Self::default());
        }
        Self::load_from(&default_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default config pointing at a specific database
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig {
                path: path.into(),
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            max_rows: self.limits.max_rows,
            max_bytes: self.limits.max_bytes,
            timeout: match self.database.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = GatewayConfig::parse("").unwrap();
        assert_eq!(config.database.path, PathBuf::from("Chinook.db"));
        assert_eq!(config.database.timeout_secs, 30);
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.limits.max_rows, 1000);
        assert_eq!(config.limits.max_bytes, 1024 * 1024);
        assert_eq!(config.schema.cache_ttl_secs, 60);
        assert!(config.validator.extra_forbidden_keywords.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config = GatewayConfig::parse(
            r#"
            [database]
            path = "/data/music.db"
            timeout_secs = 0

            [limits]
            max_rows = 50

            [validator]
            extra_forbidden_keywords = ["load_extension"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/data/music.db"));
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.limits.max_rows, 50);
        assert_eq!(config.limits.max_bytes, 1024 * 1024);
        assert_eq!(config.validator.extra_forbidden_keywords, vec!["load_extension"]);

        let limits = config.query_limits();
        assert_eq!(limits.max_rows, 50);
        assert!(limits.timeout.is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        assert!(GatewayConfig::parse("[database]\npath = 42").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GatewayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[schema]\ncache_ttl_secs = 5\n").unwrap();

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.schema_cache_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn test_with_database() {
        let config = GatewayConfig::with_database("/tmp/x.db");
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.query_limits().timeout, Some(Duration::from_secs(30)));
    }
}
