//! Read-only summary of what the schema currently holds.

use serde::Serialize;

use crate::duckdb::{quote_ident, ConnectionHandle};
use crate::tables::ACTIVOS;
use crate::WarehouseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketCount {
    pub market: String,
    pub instruments: u64,
}

/// Row counts of every table in the schema plus the number of distinct
/// instruments per market in `activos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub schema: String,
    pub tables: Vec<TableCount>,
    pub markets: Vec<MarketCount>,
}

impl Inventory {
    /// Rows in `table`, if the table exists.
    #[must_use]
    pub fn rows(&self, table: &str) -> Option<u64> {
        self.tables
            .iter()
            .find(|count| count.table == table)
            .map(|count| count.rows)
    }
}

/// Take an inventory of the handle's schema.
///
/// # Errors
/// Returns an error if the catalog or any count query fails.
pub fn inventory(handle: &ConnectionHandle) -> Result<Inventory, WarehouseError> {
    let connection = handle.acquire()?;

    let mut statement = connection.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = ? AND table_name <> 'schema_migrations' \
         ORDER BY table_name",
    )?;
    let names = statement
        .query_map([handle.schema()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let rows: i64 = connection.query_row(
            &format!("SELECT COUNT(*) FROM {}", handle.qualified(&name)),
            [],
            |row| row.get(0),
        )?;
        tables.push(TableCount {
            table: name,
            rows: u64::try_from(rows).unwrap_or(0),
        });
    }

    let market = quote_ident("market");
    let ticker = quote_ident("ticker");
    let mut statement = connection.prepare(&format!(
        "SELECT {market}, COUNT(DISTINCT {ticker}) FROM {} GROUP BY {market} ORDER BY {market}",
        handle.qualified(ACTIVOS.name)
    ))?;
    let markets = statement
        .query_map([], |row| {
            Ok(MarketCount {
                market: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                instruments: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Inventory {
        schema: handle.schema().to_string(),
        tables,
        markets,
    })
}
