//! Market-data source contract.
//!
//! One method per sub-resource of a ticker. Each call stands on its own:
//! a failing sub-resource must not prevent the others from being fetched.
//!
//! | Sub-resource | Method | Table(s) fed |
//! |--------------|--------|--------------|
//! | Profile | [`profile`](MarketDataSource::profile) | `activos`, `rendimiento_financiero`, `estados_financieros`, `consenso_analistas` |
//! | History | [`history`](MarketDataSource::history) | `mercado_diario` |
//! | Dividends | [`dividends`](MarketDataSource::dividends) | `dividendos` |
//! | Splits | [`splits`](MarketDataSource::splits) | `splits` |
//! | Recommendations | [`recommendations`](MarketDataSource::recommendations) | `recomendaciones` |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{DailyBar, Dividend, RecommendationTrend, Split, Symbol, TickerProfile, ValidationError};

/// Boxed future returned by source methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Per-ticker sub-resource, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    Profile,
    History,
    Dividends,
    Splits,
    Recommendations,
}

impl SubResource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::History => "history",
            Self::Dividends => "dividends",
            Self::Splits => "splits",
            Self::Recommendations => "recommendations",
        }
    }
}

impl Display for SubResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport failure, non-success status or provider-side error.
    Unavailable,
    /// The response could not be decoded.
    Parse,
    /// The provider has no data for the symbol.
    NotFound,
    /// The request itself was invalid.
    Validation,
}

/// Structured fetch error for one sub-resource call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Validation,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Unavailable => "fetch.unavailable",
            FetchErrorKind::Parse => "fetch.parse",
            FetchErrorKind::NotFound => "fetch.not_found",
            FetchErrorKind::Validation => "fetch.validation",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

impl From<ValidationError> for FetchError {
    fn from(error: ValidationError) -> Self {
        Self::validation(error.to_string())
    }
}

/// Source of per-ticker market data.
///
/// Implemented by the real network client and by in-memory fakes. Calls are
/// made one at a time; implementations must still be `Send + Sync` so they
/// can be shared behind an `Arc`.
pub trait MarketDataSource: Send + Sync {
    /// Short identifier used in logs (`yahoo`, `fake`).
    fn name(&self) -> &'static str;

    /// Descriptive and fundamental data.
    ///
    /// # Errors
    /// A failed profile makes the pipeline skip the ticker entirely.
    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, TickerProfile>;

    /// Daily bars over the configured history range, oldest first.
    fn history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<DailyBar>>;

    /// Dividend events over the same range.
    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Dividend>>;

    /// Split events over the same range.
    fn splits<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Split>>;

    /// Analyst rating counts per relative month.
    fn recommendations<'a>(&'a self, symbol: &'a Symbol)
        -> SourceFuture<'a, Vec<RecommendationTrend>>;
}
