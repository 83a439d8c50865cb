//! Core of the mercados loader.
//!
//! This crate contains:
//! - The tracked universe (`IBEX_35`, `COLCAP`) and the per-ticker domain models
//! - The market-data source contract with a Yahoo Finance client and an
//!   in-memory fake
//! - Request pacing between tickers
//! - Reshaping of fetched data into the eight warehouse datasets
//! - The run pipeline, which hands those datasets to the warehouse's safe
//!   incremental loader and audits the result

pub mod adapters;
pub mod data_source;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod pipeline;
pub mod throttling;

pub use adapters::{FakeSource, FakeTicker, YahooSource};
pub use data_source::{FetchError, FetchErrorKind, MarketDataSource, SourceFuture, SubResource};
pub use datasets::{Datasets, TickerData};
pub use domain::{
    resolve, resolve_text, round2, truncate, universe, DailyBar, Dividend, Documented,
    Instrument, Market, RecommendationTrend, Split, Symbol, TickerProfile, NOT_AVAILABLE,
};
pub use error::ValidationError;
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineError, RunSummary, TableReport, TableStatus,
};
pub use throttling::Pacer;
