use serde::{Deserialize, Serialize};
use time::Date;

/// Descriptive and fundamental data for one ticker, as far as the provider
/// knows it. Every field is optional; defaults are applied when rows are
/// built, see [`crate::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerProfile {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub business_summary: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub quote_type: Option<String>,
    pub currency: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,

    pub market_cap: Option<f64>,
    pub fifty_day_average: Option<f64>,
    pub two_hundred_day_average: Option<f64>,
    pub fifty_two_week_change_percent: Option<f64>,

    pub total_cash: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_revenue: Option<f64>,
    pub profit_margins: Option<f64>,
    pub gross_profits: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub ebitda: Option<f64>,
    pub net_income_to_common: Option<f64>,
    pub financial_currency: Option<String>,
    pub price_to_sales_ttm: Option<f64>,
    pub enterprise_to_revenue: Option<f64>,
    pub enterprise_to_ebitda: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub forward_eps: Option<f64>,

    pub recommendation_mean: Option<f64>,
    pub analyst_count: Option<f64>,
    pub target_mean_price: Option<f64>,
}

/// One trading day. Prices the provider left out stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: Date,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl DailyBar {
    /// The provider sent a timestamp but no values at all.
    pub fn is_empty(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }
}

/// Cash dividend paid on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub date: Date,
    pub amount: f64,
}

/// Stock split effective on `date`; `ratio` is new shares per old share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub date: Date,
    pub ratio: f64,
}

/// Analyst rating counts for one relative month (`0m`, `-1m`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationTrend {
    pub period: String,
    pub strong_buy: Option<i64>,
    pub buy: Option<i64>,
    pub hold: Option<i64>,
    pub sell: Option<i64>,
    pub strong_sell: Option<i64>,
}
