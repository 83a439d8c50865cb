use mercados_core::{universe, FakeSource, MarketDataSource, Pipeline, PipelineConfig, YahooSource};
use serde_json::Value;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;

/// Full load run. Partial failures are reported in the summary and still
/// exit with success.
pub async fn run(args: &RunArgs) -> Result<Value, CliError> {
    let config = PipelineConfig::from_env()?;

    let source: Box<dyn MarketDataSource> = if args.offline {
        Box::new(FakeSource::sample(&universe(&config.markets)?))
    } else {
        Box::new(YahooSource::new(config.history_range.clone()))
    };
    info!(
        source = source.name(),
        db_path = %config.warehouse.db_path.display(),
        "starting run"
    );

    let summary = Pipeline::new(config).run(source.as_ref()).await?;
    Ok(serde_json::to_value(&summary)?)
}
