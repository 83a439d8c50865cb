//! Warehouse configuration resolved from defaults and the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::WarehouseError;

/// Schema used when nothing else is configured.
pub const DEFAULT_SCHEMA: &str = "colcap_ibex";

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Schema every table lives in. Created if absent.
    pub schema: String,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
    /// Idle connections older than this are discarded instead of reused.
    pub recycle_after: Duration,
    /// Attempts made to open the store before giving up.
    pub connect_attempts: u32,
    /// Pause between two connection attempts.
    pub connect_retry_delay: Duration,
    /// Rows per physical `INSERT` statement inside a write transaction.
    pub chunk_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_mercados_home()
                .join("warehouse")
                .join("mercados.duckdb"),
            schema: DEFAULT_SCHEMA.to_string(),
            max_pool_size: 4,
            recycle_after: Duration::from_secs(3600),
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
            chunk_size: 1000,
        }
    }
}

impl WarehouseConfig {
    /// Build a configuration for a database file at `db_path`, keeping every
    /// other default.
    #[must_use]
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `MERCADOS_*` environment variables.
    ///
    /// Values that do not parse are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env_non_empty("MERCADOS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(schema) = env_non_empty("MERCADOS_SCHEMA") {
            config.schema = schema;
        }
        if let Some(size) = env_parsed("MERCADOS_POOL_SIZE") {
            config.max_pool_size = size;
        }
        if let Some(size) = env_parsed("MERCADOS_CHUNK_SIZE") {
            config.chunk_size = size;
        }
        config
    }

    /// Check the values that would otherwise fail deep inside a run.
    ///
    /// # Errors
    /// Returns [`WarehouseError::InvalidConfig`] for an unusable schema name,
    /// a zero chunk size or zero connection attempts.
    pub fn validate(&self) -> Result<(), WarehouseError> {
        validate_identifier(&self.schema)?;
        if self.chunk_size == 0 {
            return Err(WarehouseError::InvalidConfig(String::from(
                "chunk size must be greater than zero",
            )));
        }
        if self.connect_attempts == 0 {
            return Err(WarehouseError::InvalidConfig(String::from(
                "connect attempts must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Schema names are spliced into SQL, so only plain identifiers are accepted.
pub(crate) fn validate_identifier(name: &str) -> Result<(), WarehouseError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(WarehouseError::InvalidConfig(String::from(
            "schema name cannot be empty",
        )));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(WarehouseError::InvalidConfig(format!(
            "schema name '{name}' must start with a letter or underscore"
        )));
    }
    if let Some(ch) = chars.find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_')) {
        return Err(WarehouseError::InvalidConfig(format!(
            "schema name '{name}' contains invalid character '{ch}'"
        )));
    }
    Ok(())
}

fn resolve_mercados_home() -> PathBuf {
    if let Some(path) = env::var_os("MERCADOS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".mercados");
    }

    PathBuf::from(".mercados")
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_non_empty(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
