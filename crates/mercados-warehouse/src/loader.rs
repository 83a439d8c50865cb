//! Safe incremental loading: read back the keys a table already holds,
//! keep only the rows that are new, and append them in one transaction.

use std::collections::HashSet;

use ::duckdb::types::Value;
use ::duckdb::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::duckdb::{quote_ident, ConnectionHandle};
use crate::tables::{KeyTuple, TableRow, TableSpec};
use crate::WarehouseError;

/// Result of one table write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub table: &'static str,
    /// Rows handed to the writer.
    pub received: usize,
    /// Rows actually appended.
    pub written: usize,
    /// Rows dropped because their key was already stored.
    pub skipped_existing: usize,
    /// Rows dropped because an earlier row of the same batch had their key.
    pub skipped_in_batch: usize,
}

impl WriteOutcome {
    fn noop(table: &'static str, received: usize) -> Self {
        Self {
            table,
            received,
            written: 0,
            skipped_existing: 0,
            skipped_in_batch: 0,
        }
    }

    /// Nothing was appended.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.written == 0
    }
}

/// Keys already persisted in `table`.
///
/// Issues one `SELECT DISTINCT` over the key columns, each cast to text.
/// Returns an empty set for snapshot tables, and also when the table is
/// missing or the query fails; such failures are logged, never raised.
#[must_use]
pub fn existing_keys(handle: &ConnectionHandle, table: &TableSpec) -> HashSet<KeyTuple> {
    let Some(key_columns) = table.key_columns else {
        return HashSet::new();
    };

    let connection = match handle.acquire() {
        Ok(connection) => connection,
        Err(error) => {
            warn!(table = table.name, %error, "could not read existing keys, treating table as fresh");
            return HashSet::new();
        }
    };

    let sql = distinct_keys_sql(&handle.qualified(table.name), key_columns);
    match read_keys(&connection, &sql, key_columns.len()) {
        Ok(keys) => {
            debug!(table = table.name, existing = keys.len(), "loaded existing keys");
            keys
        }
        Err(error) => {
            warn!(table = table.name, %error, "could not read existing keys, treating table as fresh");
            HashSet::new()
        }
    }
}

fn distinct_keys_sql(qualified_table: &str, key_columns: &[&str]) -> String {
    let projection = key_columns
        .iter()
        .map(|column| format!("CAST({} AS VARCHAR)", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT DISTINCT {projection} FROM {qualified_table}")
}

fn read_keys(
    connection: &Connection,
    sql: &str,
    width: usize,
) -> Result<HashSet<KeyTuple>, ::duckdb::Error> {
    let mut statement = connection.prepare(sql)?;
    let mut rows = statement.query([])?;
    let mut keys = HashSet::new();
    while let Some(row) = rows.next()? {
        let mut key = Vec::with_capacity(width);
        for index in 0..width {
            let part: Option<String> = row.get(index)?;
            key.push(part.unwrap_or_default());
        }
        keys.insert(key);
    }
    Ok(keys)
}

/// Rows whose key is absent from `existing`, in their original order.
///
/// Runs in `O(n)`: each row costs one hash lookup. Rows for which
/// `key_of` yields `None` have no natural key and are always kept.
pub fn delta<'a, R, F>(rows: &'a [R], existing: &HashSet<KeyTuple>, key_of: F) -> Vec<&'a R>
where
    F: Fn(&R) -> Option<KeyTuple>,
{
    rows.iter()
        .filter(|row| key_of(*row).map_or(true, |key| !existing.contains(&key)))
        .collect()
}

/// Keep the first row for every key within one batch.
fn first_per_key<'a, R: TableRow>(rows: Vec<&'a R>) -> Vec<&'a R> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| row.key().map_or(true, |key| seen.insert(key)))
        .collect()
}

/// Append `rows` to `table`, skipping rows whose natural key is stored.
///
/// * Empty input is a successful no-op; nothing is read or written.
/// * Keyed tables are filtered through [`existing_keys`] and [`delta`]; if
///   nothing is left the call is a successful no-op.
/// * Snapshot tables (no key columns) get every row.
///
/// The surviving rows are inserted in chunks of the configured size inside
/// a single transaction.
///
/// # Errors
/// Returns [`WarehouseError::Write`] if any chunk fails. The transaction is
/// rolled back, so the table keeps its pre-write contents.
pub fn write<R: TableRow>(
    handle: &ConnectionHandle,
    table: &'static TableSpec,
    rows: &[R],
) -> Result<WriteOutcome, WarehouseError> {
    if rows.is_empty() {
        info!(table = table.name, "no rows to write, skipping");
        return Ok(WriteOutcome::noop(table.name, 0));
    }

    let mut outcome = WriteOutcome::noop(table.name, rows.len());
    let pending: Vec<&R> = if table.is_keyed() {
        let existing = existing_keys(handle, table);
        let fresh = delta(rows, &existing, R::key);
        outcome.skipped_existing = rows.len() - fresh.len();
        let unique = first_per_key(fresh);
        outcome.skipped_in_batch = rows.len() - outcome.skipped_existing - unique.len();
        unique
    } else {
        rows.iter().collect()
    };

    if pending.is_empty() {
        info!(
            table = table.name,
            received = outcome.received,
            "table already up to date"
        );
        return Ok(outcome);
    }

    let connection = handle.acquire()?;
    let chunk_size = handle.config().chunk_size.max(1);
    let qualified = handle.qualified(table.name);
    insert_atomically(&connection, &qualified, table, &pending, chunk_size)
        .map_err(|source| WarehouseError::Write {
            table: table.name,
            source,
        })?;

    outcome.written = pending.len();
    info!(
        table = table.name,
        written = outcome.written,
        skipped_existing = outcome.skipped_existing,
        skipped_in_batch = outcome.skipped_in_batch,
        "table written"
    );
    Ok(outcome)
}

fn insert_atomically<R: TableRow>(
    connection: &Connection,
    qualified_table: &str,
    table: &TableSpec,
    rows: &[&R],
    chunk_size: usize,
) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<(), ::duckdb::Error> {
        let columns = table.column_list();
        let group = table.row_placeholders();
        for chunk in rows.chunks(chunk_size) {
            let sql = format!(
                "INSERT INTO {qualified_table} ({columns}) VALUES {}",
                vec![group.as_str(); chunk.len()].join(", ")
            );
            let values: Vec<Value> = chunk.iter().flat_map(|row| row.values()).collect();
            connection.execute(&sql, params_from_iter(values.iter()))?;
        }
        Ok(())
    })();

    finalize_transaction(connection, result)
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, ::duckdb::Error>,
) -> Result<T, ::duckdb::Error> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row {
        ticker: &'static str,
        date: &'static str,
    }

    fn key(row: &Row) -> Option<KeyTuple> {
        Some(vec![row.ticker.to_string(), row.date.to_string()])
    }

    fn keys(pairs: &[(&str, &str)]) -> HashSet<KeyTuple> {
        pairs
            .iter()
            .map(|(ticker, date)| vec![ticker.to_string(), date.to_string()])
            .collect()
    }

    #[test]
    fn delta_keeps_only_unseen_keys_in_order() {
        let rows = [
            Row { ticker: "A", date: "2024-01-01" },
            Row { ticker: "B", date: "2024-01-01" },
            Row { ticker: "C", date: "2024-01-01" },
            Row { ticker: "A", date: "2024-01-02" },
        ];
        let existing = keys(&[("B", "2024-01-01")]);

        let kept = delta(&rows, &existing, key);
        let kept: Vec<_> = kept.iter().map(|row| (row.ticker, row.date)).collect();
        assert_eq!(
            kept,
            vec![("A", "2024-01-01"), ("C", "2024-01-01"), ("A", "2024-01-02")]
        );
    }

    #[test]
    fn delta_with_no_existing_keys_keeps_everything() {
        let rows = [
            Row { ticker: "A", date: "2024-01-01" },
            Row { ticker: "B", date: "2024-01-01" },
        ];
        assert_eq!(delta(&rows, &HashSet::new(), key).len(), 2);
    }

    #[test]
    fn delta_of_fully_stored_batch_is_empty() {
        let rows = [Row { ticker: "A", date: "2024-01-01" }];
        let existing = keys(&[("A", "2024-01-01"), ("Z", "2023-12-29")]);
        assert!(delta(&rows, &existing, key).is_empty());
    }

    #[test]
    fn delta_keeps_rows_without_key() {
        let rows = [Row { ticker: "A", date: "2024-01-01" }];
        let existing = keys(&[("A", "2024-01-01")]);
        assert_eq!(delta(&rows, &existing, |_| None).len(), 1);
    }

    #[test]
    fn key_query_casts_every_column_to_text() {
        let sql = distinct_keys_sql("\"s\".\"dividendos\"", &["ticker", "Date"]);
        assert_eq!(
            sql,
            "SELECT DISTINCT CAST(\"ticker\" AS VARCHAR), CAST(\"Date\" AS VARCHAR) FROM \"s\".\"dividendos\""
        );
    }
}
