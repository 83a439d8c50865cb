//! Typed rows for the eight market tables.
//!
//! Every field is already resolved: absent provider values have been
//! replaced by their documented defaults before a record is built.

use ::duckdb::types::Value;
use serde::Serialize;
use time::Date;

use crate::tables::{KeyTuple, TableRow};

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn day(value: Date) -> Value {
    Value::Text(value.to_string())
}

fn ticker_date_key(ticker: &str, date: Date) -> Option<KeyTuple> {
    Some(vec![ticker.to_string(), date.to_string()])
}

/// Row of `activos`: one per instrument and run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub ticker: String,
    pub market: String,
    pub name: String,
    pub short_name: String,
    pub business_summary: String,
    pub website: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub industry: String,
    pub sector: String,
    pub quote_type: String,
    pub currency: String,
    pub language: String,
    pub region: String,
}

impl TableRow for AssetRecord {
    fn values(&self) -> Vec<Value> {
        [
            &self.ticker,
            &self.market,
            &self.name,
            &self.short_name,
            &self.business_summary,
            &self.website,
            &self.phone,
            &self.address,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
            &self.industry,
            &self.sector,
            &self.quote_type,
            &self.currency,
            &self.language,
            &self.region,
        ]
        .into_iter()
        .map(|value| text(value))
        .collect()
    }
}

/// Row of `mercado_diario`, keyed by `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBarRecord {
    pub ticker: String,
    pub market: String,
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl TableRow for DailyBarRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.ticker),
            text(&self.market),
            day(self.date),
            Value::Double(self.open),
            Value::Double(self.high),
            Value::Double(self.low),
            Value::Double(self.close),
            Value::BigInt(self.volume),
        ]
    }

    fn key(&self) -> Option<KeyTuple> {
        ticker_date_key(&self.ticker, self.date)
    }
}

/// Row of `rendimiento_financiero`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub ticker: String,
    pub market: String,
    pub market_cap: f64,
    pub fifty_day_average: f64,
    pub two_hundred_day_average: f64,
    pub fifty_two_week_change_percent: f64,
}

impl TableRow for PerformanceRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.ticker),
            text(&self.market),
            Value::Double(self.market_cap),
            Value::Double(self.fifty_day_average),
            Value::Double(self.two_hundred_day_average),
            Value::Double(self.fifty_two_week_change_percent),
        ]
    }
}

/// Row of `estados_financieros`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialStatementRecord {
    pub ticker: String,
    pub market: String,
    pub total_cash: f64,
    pub total_debt: f64,
    pub total_revenue: f64,
    pub profit_margins: f64,
    pub gross_profits: f64,
    pub free_cash_flow: f64,
    pub operating_cash_flow: f64,
    pub revenue_growth: f64,
    pub ebitda: f64,
    pub net_income_to_common: f64,
    pub financial_currency: String,
    pub price_to_sales_ttm: f64,
    pub enterprise_to_revenue: f64,
    pub enterprise_to_ebitda: f64,
    pub trailing_pe: f64,
    pub forward_pe: f64,
    pub price_to_book: f64,
    pub debt_to_equity: f64,
    pub return_on_assets: f64,
    pub return_on_equity: f64,
    pub trailing_eps: f64,
    pub forward_eps: f64,
}

impl TableRow for FinancialStatementRecord {
    fn values(&self) -> Vec<Value> {
        let leading = [
            self.total_cash,
            self.total_debt,
            self.total_revenue,
            self.profit_margins,
            self.gross_profits,
            self.free_cash_flow,
            self.operating_cash_flow,
            self.revenue_growth,
            self.ebitda,
            self.net_income_to_common,
        ];
        let trailing = [
            self.price_to_sales_ttm,
            self.enterprise_to_revenue,
            self.enterprise_to_ebitda,
            self.trailing_pe,
            self.forward_pe,
            self.price_to_book,
            self.debt_to_equity,
            self.return_on_assets,
            self.return_on_equity,
            self.trailing_eps,
            self.forward_eps,
        ];

        let mut values = Vec::with_capacity(24);
        values.push(text(&self.ticker));
        values.push(text(&self.market));
        values.extend(leading.into_iter().map(Value::Double));
        values.push(text(&self.financial_currency));
        values.extend(trailing.into_iter().map(Value::Double));
        values
    }
}

/// Row of `dividendos`, keyed by `(ticker, Date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendRecord {
    pub date: Date,
    pub ticker: String,
    pub amount: f64,
    pub market: String,
}

impl TableRow for DividendRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            day(self.date),
            text(&self.ticker),
            Value::Double(self.amount),
            text(&self.market),
        ]
    }

    fn key(&self) -> Option<KeyTuple> {
        ticker_date_key(&self.ticker, self.date)
    }
}

/// Row of `splits`, keyed by `(ticker, Date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitRecord {
    pub date: Date,
    pub ticker: String,
    pub ratio: f64,
    pub market: String,
}

impl TableRow for SplitRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            day(self.date),
            text(&self.ticker),
            Value::Double(self.ratio),
            text(&self.market),
        ]
    }

    fn key(&self) -> Option<KeyTuple> {
        ticker_date_key(&self.ticker, self.date)
    }
}

/// Row of `recomendaciones`, keyed by `(ticker, Date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationRecord {
    pub ticker: String,
    pub market: String,
    pub date: Date,
    pub period: String,
    pub strong_buy: i64,
    pub buy: i64,
    pub hold: i64,
    pub sell: i64,
    pub strong_sell: i64,
}

impl TableRow for RecommendationRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.ticker),
            text(&self.market),
            day(self.date),
            text(&self.period),
            Value::BigInt(self.strong_buy),
            Value::BigInt(self.buy),
            Value::BigInt(self.hold),
            Value::BigInt(self.sell),
            Value::BigInt(self.strong_sell),
        ]
    }

    fn key(&self) -> Option<KeyTuple> {
        ticker_date_key(&self.ticker, self.date)
    }
}

/// Row of `consenso_analistas`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusRecord {
    pub ticker: String,
    pub market: String,
    pub recommendation_mean: f64,
    pub analyst_count: i64,
    pub target_mean_price: i64,
}

impl TableRow for ConsensusRecord {
    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.ticker),
            text(&self.market),
            Value::Double(self.recommendation_mean),
            Value::BigInt(self.analyst_count),
            Value::BigInt(self.target_mean_price),
        ]
    }
}
