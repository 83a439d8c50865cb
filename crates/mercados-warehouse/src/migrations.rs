use ::duckdb::Connection;
use tracing::debug;

use crate::duckdb::quote_ident;
use crate::tables::{ALL_TABLES, DATE_KEYED_TABLES};

struct Migration {
    version: &'static str,
    sql: fn(&str) -> String,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_market_tables",
        sql: market_tables,
    },
    Migration {
        version: "0002_key_indexes",
        sql: key_indexes,
    },
];

fn market_tables(schema: &str) -> String {
    ALL_TABLES
        .iter()
        .map(|table| table.create_sql(schema))
        .collect::<Vec<_>>()
        .join("\n")
}

// Plain (non-unique) indexes: they speed up the key read-back without
// letting the store reject a write.
fn key_indexes(schema: &str) -> String {
    DATE_KEYED_TABLES
        .iter()
        .filter_map(|table| {
            let keys = table.key_columns?;
            let columns = keys
                .iter()
                .map(|key| quote_ident(key))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}.{} ({columns});",
                quote_ident(&format!("idx_{}_key", table.name)),
                quote_ident(schema),
                quote_ident(table.name),
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create `schema` if absent and bring its tables up to date.
///
/// Safe to call on every connect; applied versions are recorded in
/// `<schema>.schema_migrations` and skipped afterwards.
pub fn apply_migrations(connection: &Connection, schema: &str) -> Result<(), ::duckdb::Error> {
    let schema_ident = quote_ident(schema);
    connection.execute_batch(&format!(
        "CREATE SCHEMA IF NOT EXISTS {schema_ident};
         CREATE TABLE IF NOT EXISTS {schema_ident}.schema_migrations (
             version TEXT PRIMARY KEY,
             applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
         );"
    ))?;

    let applied_sql = format!("SELECT COUNT(*) FROM {schema_ident}.schema_migrations WHERE version = ?");
    let record_sql = format!("INSERT INTO {schema_ident}.schema_migrations (version) VALUES (?)");

    for migration in MIGRATIONS {
        let applied: i64 =
            connection.query_row(&applied_sql, [migration.version], |row| row.get(0))?;
        if applied > 0 {
            continue;
        }

        debug!(version = migration.version, schema, "applying migration");
        connection.execute_batch(&(migration.sql)(schema))?;
        connection.execute(&record_sql, [migration.version])?;
    }

    Ok(())
}
