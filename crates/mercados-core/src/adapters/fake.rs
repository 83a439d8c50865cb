use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use time::macros::date;
use time::Duration;

use crate::data_source::{FetchError, MarketDataSource, SourceFuture, SubResource};
use crate::{DailyBar, Dividend, Instrument, RecommendationTrend, Split, Symbol, TickerProfile};

/// Canned data for one ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeTicker {
    pub profile: TickerProfile,
    pub history: Vec<DailyBar>,
    pub dividends: Vec<Dividend>,
    pub splits: Vec<Split>,
    pub recommendations: Vec<RecommendationTrend>,
}

/// In-memory source with fixed answers.
///
/// Symbols without canned data answer every call with `NotFound`. Any
/// sub-resource can be made to fail with `Unavailable` through
/// [`FakeSource::failing`]. Every call is recorded in order.
#[derive(Debug, Default)]
pub struct FakeSource {
    tickers: HashMap<Symbol, FakeTicker>,
    failing: HashSet<(Symbol, SubResource)>,
    calls: Mutex<Vec<(Symbol, SubResource)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, symbol: Symbol, ticker: FakeTicker) -> Self {
        self.tickers.insert(symbol, ticker);
        self
    }

    pub fn failing(mut self, symbol: Symbol, resource: SubResource) -> Self {
        self.failing.insert((symbol, resource));
        self
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<(Symbol, SubResource)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deterministic data for every instrument: a profile, five daily bars
    /// from 2024-01-02, a dividend on every other ticker, a split on every
    /// seventh and a two-month recommendation trend.
    pub fn sample(universe: &[Instrument]) -> Self {
        universe
            .iter()
            .enumerate()
            .fold(Self::new(), |source, (index, instrument)| {
                source.with_ticker(instrument.symbol.clone(), sample_ticker(instrument, index))
            })
    }

    fn answer<T: Clone>(
        &self,
        symbol: &Symbol,
        resource: SubResource,
        pick: impl FnOnce(&FakeTicker) -> &T,
    ) -> Result<T, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((symbol.clone(), resource));

        if self.failing.contains(&(symbol.clone(), resource)) {
            return Err(FetchError::unavailable(format!(
                "{resource} for {symbol} is scripted to fail"
            )));
        }

        self.tickers
            .get(symbol)
            .map(|ticker| pick(ticker).clone())
            .ok_or_else(|| FetchError::not_found(format!("no fake data for {symbol}")))
    }
}

impl MarketDataSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, TickerProfile> {
        let result = self.answer(symbol, SubResource::Profile, |ticker| &ticker.profile);
        Box::pin(async move { result })
    }

    fn history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<DailyBar>> {
        let result = self.answer(symbol, SubResource::History, |ticker| &ticker.history);
        Box::pin(async move { result })
    }

    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Dividend>> {
        let result = self.answer(symbol, SubResource::Dividends, |ticker| &ticker.dividends);
        Box::pin(async move { result })
    }

    fn splits<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Split>> {
        let result = self.answer(symbol, SubResource::Splits, |ticker| &ticker.splits);
        Box::pin(async move { result })
    }

    fn recommendations<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> SourceFuture<'a, Vec<RecommendationTrend>> {
        let result = self.answer(symbol, SubResource::Recommendations, |ticker| {
            &ticker.recommendations
        });
        Box::pin(async move { result })
    }
}

fn sample_ticker(instrument: &Instrument, index: usize) -> FakeTicker {
    let first_day = date!(2024 - 01 - 02);
    let base = 10.0 + index as f64;
    let symbol = instrument.symbol.as_str();

    let profile = TickerProfile {
        long_name: Some(format!("{symbol} Holdings")),
        short_name: Some(symbol.to_string()),
        country: Some(String::from(match instrument.market {
            crate::Market::Ibex35 => "Spain",
            crate::Market::Colcap => "Colombia",
        })),
        sector: Some(String::from("Financial Services")),
        quote_type: Some(String::from("EQUITY")),
        currency: Some(String::from(match instrument.market {
            crate::Market::Ibex35 => "EUR",
            crate::Market::Colcap => "COP",
        })),
        market_cap: Some(1.0e9 * base),
        fifty_day_average: Some(base + 0.25),
        two_hundred_day_average: Some(base - 0.5),
        trailing_pe: Some(12.0 + index as f64 / 10.0),
        recommendation_mean: Some(2.345),
        analyst_count: Some(14.0),
        target_mean_price: Some(base * 1.2),
        ..TickerProfile::default()
    };

    let history = (0..5i64)
        .map(|day| {
            let close = base + day as f64 * 0.1;
            DailyBar {
                date: first_day + Duration::days(day),
                open: Some(close - 0.05),
                high: Some(close + 0.2),
                low: Some(close - 0.2),
                close: Some(close),
                volume: Some(10_000 + day * 100),
            }
        })
        .collect();

    let dividends = if index % 2 == 0 {
        vec![Dividend {
            date: first_day + Duration::days(2),
            amount: 0.15,
        }]
    } else {
        Vec::new()
    };

    let splits = if index % 7 == 0 {
        vec![Split {
            date: first_day + Duration::days(3),
            ratio: 2.0,
        }]
    } else {
        Vec::new()
    };

    let recommendations = ["0m", "-1m"]
        .into_iter()
        .map(|period| RecommendationTrend {
            period: period.to_string(),
            strong_buy: Some(3),
            buy: Some(7),
            hold: Some(4),
            sell: Some(1),
            strong_sell: Some(0),
        })
        .collect();

    FakeTicker {
        profile,
        history,
        dividends,
        splits,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::{universe, Market};

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn unknown_symbols_are_not_found() {
        let source = FakeSource::new();
        let error = source
            .profile(&symbol("SAN.MC"))
            .await
            .expect_err("no data");
        assert_eq!(error.kind(), FetchErrorKind::NotFound);
    }

    #[tokio::test]
    async fn scripted_failures_hit_one_sub_resource() {
        let san = symbol("SAN.MC");
        let source = FakeSource::new()
            .with_ticker(san.clone(), FakeTicker::default())
            .failing(san.clone(), SubResource::Dividends);

        assert!(source.profile(&san).await.is_ok());
        let error = source.dividends(&san).await.expect_err("scripted");
        assert_eq!(error.kind(), FetchErrorKind::Unavailable);
        assert_eq!(
            source.calls(),
            vec![
                (san.clone(), SubResource::Profile),
                (san, SubResource::Dividends)
            ]
        );
    }

    #[tokio::test]
    async fn sample_is_deterministic() {
        let instruments = universe(&[Market::Colcap]).expect("universe");
        let first = FakeSource::sample(&instruments);
        let second = FakeSource::sample(&instruments);
        let symbol = &instruments[0].symbol;

        assert_eq!(
            first.history(symbol).await.expect("history"),
            second.history(symbol).await.expect("history")
        );
        assert_eq!(first.history(symbol).await.expect("history").len(), 5);
        assert_eq!(first.splits(symbol).await.expect("splits").len(), 1);
        assert!(first
            .splits(&instruments[1].symbol)
            .await
            .expect("splits")
            .is_empty());
    }
}
