mod audit;
mod run;
mod tables;

use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Execute the selected command and return its JSON payload.
pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Audit => audit::run(),
        Command::Tables => tables::run(),
    }
}
