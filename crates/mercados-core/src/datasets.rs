//! Reshaping of fetched ticker data into the eight warehouse datasets.
//!
//! Absent values are resolved here and nowhere else. Prices in
//! `mercado_diario` and the consensus mean are rounded to two decimals; the
//! analyst count and target price are truncated to integers. Zero dividends
//! and zero split ratios carry no information and are dropped.

use mercados_warehouse::records::{
    AssetRecord, ConsensusRecord, DailyBarRecord, DividendRecord, FinancialStatementRecord,
    PerformanceRecord, RecommendationRecord, SplitRecord,
};
use serde::Serialize;
use time::{Date, Month};
use tracing::warn;

use crate::{
    resolve, resolve_text, round2, truncate, DailyBar, Dividend, Instrument, RecommendationTrend,
    Split, TickerProfile, ValidationError,
};

/// Everything fetched for one ticker whose profile was available.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerData {
    pub instrument: Instrument,
    pub profile: TickerProfile,
    pub history: Vec<DailyBar>,
    pub dividends: Vec<Dividend>,
    pub splits: Vec<Split>,
    pub recommendations: Vec<RecommendationTrend>,
}

impl TickerData {
    /// Ticker with a profile and nothing else.
    pub fn new(instrument: Instrument, profile: TickerProfile) -> Self {
        Self {
            instrument,
            profile,
            history: Vec::new(),
            dividends: Vec::new(),
            splits: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Rows for every warehouse table, ticker by ticker in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datasets {
    pub activos: Vec<AssetRecord>,
    pub mercado_diario: Vec<DailyBarRecord>,
    pub rendimiento_financiero: Vec<PerformanceRecord>,
    pub estados_financieros: Vec<FinancialStatementRecord>,
    pub dividendos: Vec<DividendRecord>,
    pub splits: Vec<SplitRecord>,
    pub recomendaciones: Vec<RecommendationRecord>,
    pub consenso_analistas: Vec<ConsensusRecord>,
}

impl Datasets {
    /// Build all datasets. `as_of` anchors relative recommendation periods.
    pub fn build(fetched: &[TickerData], as_of: Date) -> Self {
        let mut datasets = Self::default();
        for data in fetched {
            datasets.push_ticker(data, as_of);
        }
        datasets
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    pub fn total_rows(&self) -> usize {
        self.activos.len()
            + self.mercado_diario.len()
            + self.rendimiento_financiero.len()
            + self.estados_financieros.len()
            + self.dividendos.len()
            + self.splits.len()
            + self.recomendaciones.len()
            + self.consenso_analistas.len()
    }

    fn push_ticker(&mut self, data: &TickerData, as_of: Date) {
        let ticker = data.instrument.symbol.as_str().to_string();
        let market = data.instrument.market.code().to_string();
        let profile = &data.profile;

        self.activos.push(asset(&ticker, &market, profile));
        self.rendimiento_financiero.push(PerformanceRecord {
            ticker: ticker.clone(),
            market: market.clone(),
            market_cap: resolve(profile.market_cap),
            fifty_day_average: resolve(profile.fifty_day_average),
            two_hundred_day_average: resolve(profile.two_hundred_day_average),
            fifty_two_week_change_percent: resolve(profile.fifty_two_week_change_percent),
        });
        self.estados_financieros
            .push(financial_statement(&ticker, &market, profile));
        self.consenso_analistas.push(ConsensusRecord {
            ticker: ticker.clone(),
            market: market.clone(),
            recommendation_mean: round2(resolve(profile.recommendation_mean)),
            analyst_count: truncate(profile.analyst_count),
            target_mean_price: truncate(profile.target_mean_price),
        });

        self.mercado_diario
            .extend(data.history.iter().map(|bar| DailyBarRecord {
                ticker: ticker.clone(),
                market: market.clone(),
                date: bar.date,
                open: round2(resolve(bar.open)),
                high: round2(resolve(bar.high)),
                low: round2(resolve(bar.low)),
                close: round2(resolve(bar.close)),
                volume: resolve(bar.volume),
            }));

        self.dividendos.extend(
            data.dividends
                .iter()
                .filter(|dividend| resolve(Some(dividend.amount)) != 0.0)
                .map(|dividend| DividendRecord {
                    date: dividend.date,
                    ticker: ticker.clone(),
                    amount: dividend.amount,
                    market: market.clone(),
                }),
        );

        self.splits.extend(
            data.splits
                .iter()
                .filter(|split| resolve(Some(split.ratio)) != 0.0)
                .map(|split| SplitRecord {
                    date: split.date,
                    ticker: ticker.clone(),
                    ratio: split.ratio,
                    market: market.clone(),
                }),
        );

        for trend in &data.recommendations {
            let date = match period_start(&trend.period, as_of) {
                Ok(date) => date,
                Err(error) => {
                    warn!(ticker = %ticker, %error, "skipping recommendation trend row");
                    continue;
                }
            };
            self.recomendaciones.push(RecommendationRecord {
                ticker: ticker.clone(),
                market: market.clone(),
                date,
                period: trend.period.clone(),
                strong_buy: resolve(trend.strong_buy),
                buy: resolve(trend.buy),
                hold: resolve(trend.hold),
                sell: resolve(trend.sell),
                strong_sell: resolve(trend.strong_sell),
            });
        }
    }
}

fn asset(ticker: &str, market: &str, profile: &TickerProfile) -> AssetRecord {
    AssetRecord {
        ticker: ticker.to_string(),
        market: market.to_string(),
        name: resolve_text(&profile.long_name),
        short_name: resolve_text(&profile.short_name),
        business_summary: resolve_text(&profile.business_summary),
        website: resolve_text(&profile.website),
        phone: resolve_text(&profile.phone),
        address: resolve_text(&profile.address),
        city: resolve_text(&profile.city),
        state: resolve_text(&profile.state),
        postal_code: resolve_text(&profile.zip),
        country: resolve_text(&profile.country),
        industry: resolve_text(&profile.industry),
        sector: resolve_text(&profile.sector),
        quote_type: resolve_text(&profile.quote_type),
        currency: resolve_text(&profile.currency),
        language: resolve_text(&profile.language),
        region: resolve_text(&profile.region),
    }
}

fn financial_statement(ticker: &str, market: &str, profile: &TickerProfile) -> FinancialStatementRecord {
    FinancialStatementRecord {
        ticker: ticker.to_string(),
        market: market.to_string(),
        total_cash: resolve(profile.total_cash),
        total_debt: resolve(profile.total_debt),
        total_revenue: resolve(profile.total_revenue),
        profit_margins: resolve(profile.profit_margins),
        gross_profits: resolve(profile.gross_profits),
        free_cash_flow: resolve(profile.free_cash_flow),
        operating_cash_flow: resolve(profile.operating_cash_flow),
        revenue_growth: resolve(profile.revenue_growth),
        ebitda: resolve(profile.ebitda),
        net_income_to_common: resolve(profile.net_income_to_common),
        financial_currency: resolve_text(&profile.financial_currency),
        price_to_sales_ttm: resolve(profile.price_to_sales_ttm),
        enterprise_to_revenue: resolve(profile.enterprise_to_revenue),
        enterprise_to_ebitda: resolve(profile.enterprise_to_ebitda),
        trailing_pe: resolve(profile.trailing_pe),
        forward_pe: resolve(profile.forward_pe),
        price_to_book: resolve(profile.price_to_book),
        debt_to_equity: resolve(profile.debt_to_equity),
        return_on_assets: resolve(profile.return_on_assets),
        return_on_equity: resolve(profile.return_on_equity),
        trailing_eps: resolve(profile.trailing_eps),
        forward_eps: resolve(profile.forward_eps),
    }
}

/// First day of the month a relative period (`0m`, `-1m`, ...) refers to.
pub fn period_start(period: &str, as_of: Date) -> Result<Date, ValidationError> {
    let invalid = || ValidationError::InvalidPeriod {
        value: period.to_string(),
    };

    let months_back: i32 = period
        .strip_suffix('m')
        .and_then(|count| count.parse::<i32>().ok())
        .filter(|count| *count <= 0)
        .map(|count| -count)
        .ok_or_else(invalid)?;

    let month_index = as_of.year() * 12 + i32::from(u8::from(as_of.month())) - 1 - months_back;
    let year = month_index.div_euclid(12);
    let month = u8::try_from(month_index.rem_euclid(12) + 1)
        .ok()
        .and_then(|month| Month::try_from(month).ok())
        .ok_or_else(invalid)?;

    Date::from_calendar_date(year, month, 1).map_err(|_| invalid())
}
