use mercados_warehouse::{audit, connect, tables, WarehouseConfig};
use serde_json::{json, Value};

use crate::error::CliError;

/// Duplicate audit on its own. Findings are data, not errors.
pub fn run() -> Result<Value, CliError> {
    let handle = connect(WarehouseConfig::from_env())?;
    let report = audit::audit(&handle, &tables::DATE_KEYED_TABLES);
    let schema = handle.schema().to_string();
    handle.close();

    Ok(json!({
        "schema": schema,
        "clean": report.is_clean(),
        "duplicate_groups": report.violation_count(),
        "tables": report,
    }))
}
