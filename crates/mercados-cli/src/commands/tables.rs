use mercados_warehouse::{connect, inventory, WarehouseConfig};
use serde_json::Value;

use crate::error::CliError;

pub fn run() -> Result<Value, CliError> {
    let handle = connect(WarehouseConfig::from_env())?;
    let counts = inventory(&handle);
    handle.close();
    Ok(serde_json::to_value(counts?)?)
}
