//! `DuckDB` connection management: a small recycling pool and the
//! [`ConnectionHandle`] threaded through one loader run.

use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use ::duckdb::Connection;
use tracing::{debug, info};

use crate::config::WarehouseConfig;
use crate::migrations;
use crate::retry::RetryPolicy;
use crate::WarehouseError;

struct IdleConnection {
    connection: Connection,
    opened_at: Instant,
}

struct PoolInner {
    root: Mutex<Connection>,
    max_pool_size: usize,
    recycle_after: std::time::Duration,
    idle: Mutex<Vec<IdleConnection>>,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, opened_at: Instant) -> bool {
        opened_at.elapsed() >= self.recycle_after
    }
}

/// A pool of connections to one open database.
///
/// Every pooled connection is a clone of a single root connection, so they
/// all share one database instance. Idle connections older than the recycle
/// interval are dropped, and every connection is pinged before it is handed
/// out.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    fn new(root: Connection, config: &WarehouseConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                root: Mutex::new(root),
                max_pool_size: config.max_pool_size.max(1),
                recycle_after: config.recycle_after,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Acquire a live connection from the pool.
    ///
    /// # Errors
    /// Returns an error if a fresh connection cannot be cloned from the root
    /// or fails its liveness check.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        loop {
            let candidate = self.inner.idle().pop();
            let Some(IdleConnection {
                connection,
                opened_at,
            }) = candidate
            else {
                break;
            };
            if self.inner.is_expired(opened_at) {
                debug!("recycling expired pooled connection");
                continue;
            }
            if ping(&connection).is_ok() {
                return Ok(self.wrap(connection, opened_at));
            }
            debug!("discarding pooled connection that failed its ping");
        }

        let connection = self
            .inner
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_clone()?;
        ping(&connection)?;
        Ok(self.wrap(connection, Instant::now()))
    }

    /// Number of idle connections currently held.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    fn wrap(&self, connection: Connection, opened_at: Instant) -> PooledConnection {
        PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
            opened_at,
        }
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
    opened_at: Instant,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.pool.is_expired(self.opened_at) {
            return;
        }

        let mut idle = self.pool.idle();
        if idle.len() < self.pool.max_pool_size {
            idle.push(IdleConnection {
                connection,
                opened_at: self.opened_at,
            });
        }
    }
}

/// The single reusable connection context of a loader run.
///
/// Created by [`connect`]; every loader component borrows it, and the top
/// level releases it with [`ConnectionHandle::close`] (or by dropping it).
pub struct ConnectionHandle {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl ConnectionHandle {
    /// Acquire a pooled connection.
    ///
    /// # Errors
    /// Returns an error if no live connection can be produced.
    pub fn acquire(&self) -> Result<PooledConnection, WarehouseError> {
        Ok(self.manager.acquire()?)
    }

    /// The configuration this handle was opened with.
    #[must_use]
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.config.schema
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Schema-qualified, quoted name of `table`.
    #[must_use]
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.config.schema), quote_ident(table))
    }

    #[must_use]
    pub fn pool(&self) -> &DuckDbConnectionManager {
        &self.manager
    }

    /// Consume the handle. The pool and the underlying database are released
    /// when it drops at the end of this call; nothing is flushed explicitly.
    pub fn close(self) {
        info!(db_path = %self.config.db_path.display(), "closing warehouse connection");
    }
}

/// Open the configured store, retrying a bounded number of times, and make
/// sure the schema and its tables exist.
///
/// # Errors
/// Returns [`WarehouseError::InvalidConfig`] for unusable settings and
/// [`WarehouseError::Connection`] once every attempt has failed. Both are
/// fatal for the run.
pub fn connect(config: WarehouseConfig) -> Result<ConnectionHandle, WarehouseError> {
    config.validate()?;

    let policy = RetryPolicy::fixed(config.connect_retry_delay, config.connect_attempts);
    let root = policy
        .run("warehouse connection", |attempt| {
            debug!(attempt, db_path = %config.db_path.display(), "opening warehouse");
            open_root(&config)
        })
        .map_err(|exhausted| WarehouseError::Connection {
            path: config.db_path.clone(),
            attempts: exhausted.attempts,
            message: exhausted.last_error.to_string(),
        })?;

    let manager = DuckDbConnectionManager::new(root, &config);
    {
        let connection = manager.acquire()?;
        migrations::apply_migrations(&connection, &config.schema)?;
    }

    info!(
        db_path = %config.db_path.display(),
        schema = %config.schema,
        "warehouse connection established"
    );
    Ok(ConnectionHandle { config, manager })
}

fn open_root(config: &WarehouseConfig) -> Result<Connection, WarehouseError> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let connection = Connection::open(&config.db_path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    ping(&connection)?;
    Ok(connection)
}

fn ping(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
    Ok(())
}

/// Quote an identifier for `DuckDB`, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
