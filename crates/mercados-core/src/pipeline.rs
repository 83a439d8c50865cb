//! One load run: connect, fetch every ticker, reshape, write, audit, close.

use std::env;
use std::time::Duration;

use mercados_warehouse::{
    audit, connect, loader, tables, AuditReport, ConnectionHandle, TableRow, TableSpec,
    WarehouseConfig, WarehouseError, WriteOutcome,
};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, info_span, warn, Instrument as _};
use uuid::Uuid;

use crate::data_source::{FetchError, MarketDataSource, SubResource};
use crate::datasets::{Datasets, TickerData};
use crate::throttling::Pacer;
use crate::{universe, Instrument, Market, ValidationError};

pub const DEFAULT_REQUEST_PAUSE: Duration = Duration::from_millis(500);
pub const DEFAULT_HISTORY_RANGE: &str = "10y";

/// Run parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub warehouse: WarehouseConfig,
    /// Pause between consecutive tickers.
    pub request_pause: Duration,
    /// Provider range expression for history and corporate actions.
    pub history_range: String,
    pub markets: Vec<Market>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig::default(),
            request_pause: DEFAULT_REQUEST_PAUSE,
            history_range: DEFAULT_HISTORY_RANGE.to_string(),
            markets: Market::ALL.to_vec(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `MERCADOS_*` environment variables.
    ///
    /// An unparseable pause falls back to the default; an unknown market or
    /// a malformed history range is a configuration error.
    pub fn from_env() -> Result<Self, ValidationError> {
        let mut config = Self {
            warehouse: WarehouseConfig::from_env(),
            ..Self::default()
        };

        if let Ok(raw) = env::var("MERCADOS_REQUEST_PAUSE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(millis) => config.request_pause = Duration::from_millis(millis),
                Err(_) => warn!(value = %raw, "ignoring unparseable MERCADOS_REQUEST_PAUSE_MS"),
            }
        }
        if let Ok(raw) = env::var("MERCADOS_HISTORY_RANGE") {
            config.history_range = raw.trim().to_string();
        }
        if let Ok(raw) = env::var("MERCADOS_MARKETS") {
            config.markets = parse_markets(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_history_range(&self.history_range)
    }
}

/// Comma-separated market codes, duplicates removed, order kept.
pub fn parse_markets(raw: &str) -> Result<Vec<Market>, ValidationError> {
    let mut markets = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|code| !code.is_empty()) {
        let market: Market = code.parse()?;
        if !markets.contains(&market) {
            markets.push(market);
        }
    }
    if markets.is_empty() {
        return Err(ValidationError::UnknownMarket {
            value: raw.to_string(),
        });
    }
    Ok(markets)
}

/// Accepts `max`, `ytd` or a positive count followed by `d`, `wk`, `mo` or `y`.
pub fn validate_history_range(range: &str) -> Result<(), ValidationError> {
    if matches!(range, "max" | "ytd") {
        return Ok(());
    }

    let digits = range.chars().take_while(char::is_ascii_digit).count();
    let (count, unit) = range.split_at(digits);
    let count_ok = count.parse::<u32>().map(|n| n > 0).unwrap_or(false);
    if count_ok && matches!(unit, "d" | "wk" | "mo" | "y") {
        Ok(())
    } else {
        Err(ValidationError::InvalidRange {
            value: range.to_string(),
        })
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// A ticker left out of the run because its profile was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub market: Market,
    pub reason: String,
}

/// A sub-resource that failed and was replaced by an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedFetch {
    pub ticker: String,
    pub resource: SubResource,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Written {
        received: usize,
        written: usize,
        skipped_existing: usize,
        skipped_in_batch: usize,
    },
    UpToDate {
        received: usize,
        skipped_existing: usize,
        skipped_in_batch: usize,
    },
    Empty,
    Failed {
        message: String,
    },
}

impl From<&WriteOutcome> for TableStatus {
    fn from(outcome: &WriteOutcome) -> Self {
        if outcome.received == 0 {
            Self::Empty
        } else if outcome.is_noop() {
            Self::UpToDate {
                received: outcome.received,
                skipped_existing: outcome.skipped_existing,
                skipped_in_batch: outcome.skipped_in_batch,
            }
        } else {
            Self::Written {
                received: outcome.received,
                written: outcome.written,
                skipped_existing: outcome.skipped_existing,
                skipped_in_batch: outcome.skipped_in_batch,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: &'static str,
    #[serde(flatten)]
    pub status: TableStatus,
}

impl TableReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TableStatus::Failed { .. })
    }

    /// Rows appended by this run.
    pub fn written(&self) -> usize {
        match self.status {
            TableStatus::Written { written, .. } => written,
            _ => 0,
        }
    }
}

/// Outcome of a run, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: &'static str,
    pub schema: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub tickers_attempted: usize,
    pub tickers_fetched: usize,
    pub skipped: Vec<SkippedTicker>,
    pub degraded: Vec<DegradedFetch>,
    pub tables: Vec<TableReport>,
    pub audit: AuditReport,
}

impl RunSummary {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == name)
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(TableReport::written).sum()
    }

    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|report| report.is_failed()).count()
    }
}

/// Sequential load run over the configured markets.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    pacer: Pacer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let pacer = Pacer::new(config.request_pause);
        Self { config, pacer }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run against `source`.
    ///
    /// Only an invalid configuration or an unreachable warehouse aborts the
    /// run. Fetch, write and audit failures are logged, recorded in the
    /// summary and contained to their ticker, table or check. The audit runs
    /// after the writes whatever their outcome, and the connection handle is
    /// closed last.
    pub async fn run(&self, source: &dyn MarketDataSource) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, source = source.name());
        self.run_inner(run_id, source).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        source: &dyn MarketDataSource,
    ) -> Result<RunSummary, PipelineError> {
        let started_at = OffsetDateTime::now_utc();
        self.config.validate()?;
        let instruments = universe(&self.config.markets)?;

        let handle = connect(self.config.warehouse.clone()).map_err(|error| {
            error!(%error, "warehouse unreachable, aborting run");
            error
        })?;
        info!(
            schema = handle.schema(),
            tickers = instruments.len(),
            "run started"
        );

        let mut fetched = Vec::with_capacity(instruments.len());
        let mut skipped = Vec::new();
        let mut degraded = Vec::new();
        for instrument in &instruments {
            self.pacer.ready().await;
            let span = info_span!("ticker", ticker = %instrument.symbol);
            match fetch_ticker(source, instrument, &mut degraded)
                .instrument(span)
                .await
            {
                Ok(data) => fetched.push(data),
                Err(error) => skipped.push(SkippedTicker {
                    ticker: instrument.symbol.to_string(),
                    market: instrument.market,
                    reason: error.to_string(),
                }),
            }
        }

        let datasets = Datasets::build(&fetched, started_at.date());
        let table_reports = write_all(&handle, &datasets);

        let audit = audit::audit(&handle, &tables::DATE_KEYED_TABLES);
        if audit.is_clean() {
            info!("duplicate audit clean");
        } else {
            warn!(
                duplicate_groups = audit.violation_count(),
                "duplicate audit reported findings"
            );
        }

        let schema = handle.schema().to_string();
        handle.close();

        let summary = RunSummary {
            run_id,
            source: source.name(),
            schema,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            tickers_attempted: instruments.len(),
            tickers_fetched: fetched.len(),
            skipped,
            degraded,
            tables: table_reports,
            audit,
        };
        info!(
            fetched = summary.tickers_fetched,
            skipped = summary.skipped.len(),
            rows_written = summary.rows_written(),
            failed_tables = summary.failed_tables(),
            "run finished"
        );
        Ok(summary)
    }
}

async fn fetch_ticker(
    source: &dyn MarketDataSource,
    instrument: &Instrument,
    degraded: &mut Vec<DegradedFetch>,
) -> Result<TickerData, FetchError> {
    let symbol = &instrument.symbol;

    let profile = source.profile(symbol).await.map_err(|error| {
        warn!(%error, "profile unavailable, skipping ticker");
        error
    })?;
    let mut data = TickerData::new(instrument.clone(), profile);

    data.history = or_empty(source.history(symbol).await, symbol, SubResource::History, degraded);
    data.dividends = or_empty(
        source.dividends(symbol).await,
        symbol,
        SubResource::Dividends,
        degraded,
    );
    data.splits = or_empty(source.splits(symbol).await, symbol, SubResource::Splits, degraded);
    data.recommendations = or_empty(
        source.recommendations(symbol).await,
        symbol,
        SubResource::Recommendations,
        degraded,
    );

    info!(
        bars = data.history.len(),
        dividends = data.dividends.len(),
        splits = data.splits.len(),
        "ticker fetched"
    );
    Ok(data)
}

fn or_empty<T>(
    result: Result<Vec<T>, FetchError>,
    symbol: &crate::Symbol,
    resource: SubResource,
    degraded: &mut Vec<DegradedFetch>,
) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!(%resource, %error, "sub-resource unavailable, continuing without it");
        degraded.push(DegradedFetch {
            ticker: symbol.to_string(),
            resource,
            reason: error.to_string(),
        });
        Vec::new()
    })
}

/// Write every dataset in table order. A failed table is reported and the
/// remaining tables are still written.
fn write_all(handle: &ConnectionHandle, datasets: &Datasets) -> Vec<TableReport> {
    vec![
        write_table(handle, &tables::ACTIVOS, &datasets.activos),
        write_table(handle, &tables::MERCADO_DIARIO, &datasets.mercado_diario),
        write_table(
            handle,
            &tables::RENDIMIENTO_FINANCIERO,
            &datasets.rendimiento_financiero,
        ),
        write_table(
            handle,
            &tables::ESTADOS_FINANCIEROS,
            &datasets.estados_financieros,
        ),
        write_table(handle, &tables::DIVIDENDOS, &datasets.dividendos),
        write_table(handle, &tables::SPLITS, &datasets.splits),
        write_table(handle, &tables::RECOMENDACIONES, &datasets.recomendaciones),
        write_table(
            handle,
            &tables::CONSENSO_ANALISTAS,
            &datasets.consenso_analistas,
        ),
    ]
}

fn write_table<R: TableRow>(
    handle: &ConnectionHandle,
    table: &'static TableSpec,
    rows: &[R],
) -> TableReport {
    let status = match loader::write(handle, table, rows) {
        Ok(outcome) => TableStatus::from(&outcome),
        Err(write_error) => {
            error!(table = table.name, error = %write_error, "table write failed, continuing");
            TableStatus::Failed {
                message: write_error.to_string(),
            }
        }
    };
    TableReport {
        table: table.name,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ranges() {
        for ok in ["10y", "1y", "6mo", "5d", "2wk", "max", "ytd"] {
            assert!(validate_history_range(ok).is_ok(), "{ok}");
        }
        for bad in ["", "y", "0y", "10", "10years", "-1y"] {
            assert!(validate_history_range(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn market_lists() {
        assert_eq!(
            parse_markets("colcap, IBEX_35,COLCAP").expect("valid"),
            vec![Market::Colcap, Market::Ibex35]
        );
        assert!(parse_markets("NASDAQ").is_err());
        assert!(parse_markets(" , ").is_err());
    }

    #[test]
    fn table_status_from_outcome() {
        let outcome = |received, written, skipped_existing| WriteOutcome {
            table: "dividendos",
            received,
            written,
            skipped_existing,
            skipped_in_batch: 0,
        };

        assert_eq!(TableStatus::from(&outcome(0, 0, 0)), TableStatus::Empty);
        assert!(matches!(
            TableStatus::from(&outcome(4, 0, 4)),
            TableStatus::UpToDate { skipped_existing: 4, .. }
        ));
        assert!(matches!(
            TableStatus::from(&outcome(4, 1, 3)),
            TableStatus::Written { written: 1, .. }
        ));
    }

    #[test]
    fn table_report_serializes_flat() {
        let report = TableReport {
            table: "splits",
            status: TableStatus::Failed {
                message: String::from("boom"),
            },
        };
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({"table": "splits", "status": "failed", "message": "boom"})
        );
    }
}
