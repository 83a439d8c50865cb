//! Post-write check of the `(ticker, date)` uniqueness invariant.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::duckdb::{quote_ident, ConnectionHandle};
use crate::tables::TableSpec;

/// What the auditor found for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditFinding {
    /// Every key occurs once.
    Clean,
    /// Number of key groups that occur more than once.
    Duplicates { groups: u64 },
    /// The check itself could not run.
    Unchecked { reason: String },
}

/// Findings per table name, in table-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditReport {
    pub findings: BTreeMap<&'static str, AuditFinding>,
}

impl AuditReport {
    /// Total duplicated key groups over all checked tables.
    #[must_use]
    pub fn violation_count(&self) -> u64 {
        self.findings
            .values()
            .map(|finding| match finding {
                AuditFinding::Duplicates { groups } => *groups,
                _ => 0,
            })
            .sum()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings
            .values()
            .all(|finding| *finding == AuditFinding::Clean)
    }
}

/// Count duplicated key groups in every keyed table of `tables`.
///
/// Advisory only: it never fails and never touches the data. Tables without
/// key columns are skipped.
#[must_use]
pub fn audit(handle: &ConnectionHandle, tables: &[&'static TableSpec]) -> AuditReport {
    let mut report = AuditReport::default();
    for table in tables {
        let Some(key_columns) = table.key_columns else {
            continue;
        };

        let finding = match count_duplicate_groups(handle, table.name, key_columns) {
            Ok(0) => {
                info!(table = table.name, "no duplicate keys");
                AuditFinding::Clean
            }
            Ok(groups) => {
                error!(table = table.name, groups, "duplicate keys found");
                AuditFinding::Duplicates { groups }
            }
            Err(reason) => {
                warn!(table = table.name, %reason, "duplicate check could not run");
                AuditFinding::Unchecked {
                    reason: reason.to_string(),
                }
            }
        };
        report.findings.insert(table.name, finding);
    }
    report
}

fn count_duplicate_groups(
    handle: &ConnectionHandle,
    table: &str,
    key_columns: &[&str],
) -> Result<u64, crate::WarehouseError> {
    let keys = key_columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT COUNT(*) FROM (SELECT {keys} FROM {} GROUP BY {keys} HAVING COUNT(*) > 1)",
        handle.qualified(table)
    );

    let connection = handle.acquire()?;
    let groups: i64 = connection.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(groups).unwrap_or(0))
}
