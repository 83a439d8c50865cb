use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The store could not be reached within the configured attempts.
    ///
    /// This is the only fatal error of a run; callers must abort.
    #[error("could not connect to '{path}' after {attempts} attempt(s): {message}")]
    Connection {
        path: PathBuf,
        attempts: u32,
        message: String,
    },

    /// A table write failed and its transaction was rolled back.
    #[error("write to table '{table}' failed: {source}")]
    Write {
        table: &'static str,
        #[source]
        source: ::duckdb::Error,
    },

    /// Configuration values that cannot be used as given.
    #[error("invalid warehouse configuration: {0}")]
    InvalidConfig(String),

    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WarehouseError {
    /// Whether the run must stop because of this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::InvalidConfig(_))
    }
}
