//! # Domain Models
//!
//! Types describing the tracked universe and what the provider returns
//! for each ticker.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker with exchange suffix |
//! | [`Market`] | Index membership (`IBEX_35`, `COLCAP`) |
//! | [`Instrument`] | Symbol plus market |
//! | [`TickerProfile`] | Descriptive and fundamental fields, all optional |
//! | [`DailyBar`] | One trading day of OHLCV |
//! | [`Dividend`], [`Split`] | Corporate actions |
//! | [`RecommendationTrend`] | Analyst rating counts per relative month |
//!
//! Absent values are resolved to documented defaults in one place,
//! [`resolve`].

pub mod defaults;
pub mod market;
pub mod models;
pub mod symbol;

pub use defaults::{resolve, resolve_text, round2, truncate, Documented, NOT_AVAILABLE};
pub use market::{universe, Instrument, Market};
pub use models::{DailyBar, Dividend, RecommendationTrend, Split, TickerProfile};
pub use symbol::Symbol;
