//! Every market-data source must honour the same contract, whether it talks
//! to the network or answers from memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mercados_core::datasets::period_start;
use mercados_core::{
    universe, FakeSource, FetchErrorKind, HttpClient, HttpError, HttpRequest, HttpResponse,
    Market, MarketDataSource, Symbol, YahooSource,
};
use time::macros::date;

const CHART: &str = r#"{"chart":{"result":[{
  "meta":{"gmtoffset":-18000},
  "timestamp":[1704211200,1704297600,1704384000],
  "events":{"dividends":{"1704297600":{"amount":42.5,"date":1704297600}}},
  "indicators":{"quote":[{
    "open":[2500.0,2510.0,null],"high":[2550.0,2560.0,null],
    "low":[2490.0,2500.0,null],"close":[2540.0,2555.0,null],
    "volume":[1500000,1200000,null]}]}
}],"error":null}}"#;

const SUMMARY: &str = r#"{"quoteSummary":{"result":[{
  "assetProfile":{"city":"Bogota","country":"Colombia","sector":"Energy"},
  "price":{"longName":"Ecopetrol S.A.","currency":"COP","marketCap":{"raw":1.0e14}},
  "financialData":{"recommendationMean":{"raw":2.8},"numberOfAnalystOpinions":{"raw":12}},
  "recommendationTrend":{"trend":[{"period":"0m","strongBuy":1,"buy":3,"hold":6,"sell":2,"strongSell":0}]}
}],"error":null}}"#;

/// Serves canned Yahoo answers for one symbol and 404 for everything else.
struct CannedYahoo {
    symbol: &'static str,
}

impl HttpClient for CannedYahoo {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let url = request.url;
        let response = if url.contains("getcrumb") {
            HttpResponse::ok_json("contract-crumb")
        } else if url.contains("/v8/finance/chart/") && url.contains(self.symbol) {
            HttpResponse::ok_json(CHART)
        } else if url.contains("/v10/finance/quoteSummary/") && url.contains(self.symbol) {
            HttpResponse::ok_json(SUMMARY)
        } else {
            HttpResponse::with_status(404, "")
        };
        Box::pin(async move { Ok(response) })
    }
}

struct SourceCase {
    source: Arc<dyn MarketDataSource>,
    known: Symbol,
}

fn source_cases() -> Vec<SourceCase> {
    let instruments = universe(&[Market::Colcap]).expect("universe");
    let ecopetrol = Symbol::parse("ECOPETROL.CL").expect("valid symbol");
    assert!(instruments.iter().any(|i| i.symbol == ecopetrol));

    vec![
        SourceCase {
            source: Arc::new(FakeSource::sample(&instruments)),
            known: ecopetrol.clone(),
        },
        SourceCase {
            source: Arc::new(YahooSource::with_http_client(
                Arc::new(CannedYahoo {
                    symbol: "ECOPETROL.CL",
                }),
                "10y",
            )),
            known: ecopetrol,
        },
    ]
}

fn unknown() -> Symbol {
    Symbol::parse("NOPE.CL").expect("valid symbol")
}

#[tokio::test]
async fn profile_is_available_for_known_symbols() {
    for case in source_cases() {
        let name = case.source.name();
        let profile = case
            .source
            .profile(&case.known)
            .await
            .unwrap_or_else(|error| panic!("source '{name}' profile failed: {error}"));
        assert!(profile.long_name.is_some(), "source '{name}': long name");
        assert!(profile.currency.is_some(), "source '{name}': currency");
    }
}

#[tokio::test]
async fn history_is_ascending_and_never_empty_rows() {
    for case in source_cases() {
        let name = case.source.name();
        let bars = case
            .source
            .history(&case.known)
            .await
            .unwrap_or_else(|error| panic!("source '{name}' history failed: {error}"));

        assert!(!bars.is_empty(), "source '{name}': bars present");
        assert!(
            bars.windows(2).all(|pair| pair[0].date < pair[1].date),
            "source '{name}': strictly ascending dates"
        );
        assert!(
            bars.iter().all(|bar| !bar.is_empty()),
            "source '{name}': no all-empty bars"
        );
    }
}

#[tokio::test]
async fn corporate_actions_are_positive() {
    for case in source_cases() {
        let name = case.source.name();
        let dividends = case.source.dividends(&case.known).await.expect("dividends");
        let splits = case.source.splits(&case.known).await.expect("splits");

        assert!(
            dividends.iter().all(|dividend| dividend.amount > 0.0),
            "source '{name}': dividend amounts"
        );
        assert!(
            splits.iter().all(|split| split.ratio > 0.0),
            "source '{name}': split ratios"
        );
    }
}

#[tokio::test]
async fn recommendation_periods_are_relative_months() {
    for case in source_cases() {
        let name = case.source.name();
        let trend = case
            .source
            .recommendations(&case.known)
            .await
            .expect("recommendations");

        assert!(!trend.is_empty(), "source '{name}': trend present");
        for entry in &trend {
            assert!(
                period_start(&entry.period, date!(2024 - 06 - 15)).is_ok(),
                "source '{name}': period '{}'",
                entry.period
            );
        }
    }
}

#[tokio::test]
async fn unknown_symbols_are_not_found() {
    for case in source_cases() {
        let name = case.source.name();
        let error = case
            .source
            .profile(&unknown())
            .await
            .expect_err("unknown symbol must fail");
        assert_eq!(
            error.kind(),
            FetchErrorKind::NotFound,
            "source '{name}': error kind"
        );
    }
}
