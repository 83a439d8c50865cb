use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use time::{Date, OffsetDateTime};
use tracing::debug;

use crate::data_source::{FetchError, MarketDataSource, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::{DailyBar, Dividend, RecommendationTrend, Split, Symbol, TickerProfile};

const REFERER: &str = "https://finance.yahoo.com/";
const SUMMARY_MODULES: &str =
    "assetProfile,price,summaryDetail,financialData,defaultKeyStatistics,recommendationTrend";

// ============================================================================
// Yahoo Auth Manager - Handles cookie/crumb authentication
// ============================================================================

/// Manages Yahoo Finance cookie/crumb authentication.
///
/// Yahoo's unofficial API requires:
/// 1. Session cookie from fc.yahoo.com (kept by the transport's cookie jar)
/// 2. Crumb token from query1.finance.yahoo.com/v1/test/getcrumb
pub struct YahooAuthManager {
    crumb: Mutex<Option<(String, Instant)>>,
    ttl: Duration,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self {
            crumb: Mutex::new(None),
            ttl: Duration::from_secs(3600),
        }
    }
}

impl YahooAuthManager {
    fn cached(&self) -> Option<String> {
        let crumb = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        crumb
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(crumb, _)| crumb.clone())
    }

    /// Current crumb, refreshed when missing or expired.
    pub async fn crumb(&self, http_client: &dyn HttpClient) -> Result<String, FetchError> {
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        let crumb = Self::fetch_crumb(http_client).await?;
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    /// Drop the cached crumb so the next call fetches a fresh one.
    pub fn invalidate(&self) {
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn fetch_crumb(http_client: &dyn HttpClient) -> Result<String, FetchError> {
        // Any status is fine here; the point is the Set-Cookie header.
        let cookie_request = HttpRequest::get("https://fc.yahoo.com").with_header("referer", REFERER);
        http_client.execute(cookie_request).await.map_err(|e| {
            FetchError::unavailable(format!("failed to fetch Yahoo cookie: {}", e.message()))
        })?;

        let crumb_endpoints = [
            "https://query1.finance.yahoo.com/v1/test/getcrumb",
            "https://query2.finance.yahoo.com/v1/test/getcrumb",
        ];

        for endpoint in crumb_endpoints {
            let crumb_request = HttpRequest::get(endpoint).with_header("referer", REFERER);
            let Ok(response) = http_client.execute(crumb_request).await else {
                continue;
            };
            if !response.is_success() {
                continue;
            }

            let body = response.body.trim();
            if body.contains("<html") || body.contains("<!DOCTYPE") {
                continue;
            }
            if body.to_ascii_lowercase().contains("too many requests") {
                return Err(FetchError::unavailable(
                    "Yahoo rate limited while fetching crumb",
                ));
            }
            if !body.is_empty() && body.len() < 100 && !body.contains(' ') {
                return Ok(body.to_string());
            }
        }

        Err(FetchError::unavailable(
            "failed to fetch Yahoo crumb from all endpoints",
        ))
    }
}

// ============================================================================
// Yahoo Source
// ============================================================================

/// Most recent download for one symbol, success or failure.
type Memo<T> = Mutex<Option<(Symbol, Result<Arc<T>, FetchError>)>>;

/// Everything the chart endpoint returns for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub bars: Vec<DailyBar>,
    pub dividends: Vec<Dividend>,
    pub splits: Vec<Split>,
}

/// Everything the quote-summary endpoint returns for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryData {
    pub profile: TickerProfile,
    pub recommendations: Vec<RecommendationTrend>,
}

/// Yahoo Finance source.
///
/// Bars, dividends and splits come from one chart download; profile and
/// recommendation trend from one quote-summary download. Both are memoized
/// for the most recent symbol, so the five sub-resources of a ticker cost
/// two requests.
pub struct YahooSource {
    http_client: Arc<dyn HttpClient>,
    auth: YahooAuthManager,
    history_range: String,
    chart: Memo<ChartData>,
    summary: Memo<SummaryData>,
}

impl YahooSource {
    /// Source backed by the real network with the given history range
    /// (`10y`, `1y`, `max`, ...).
    pub fn new(history_range: impl Into<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), history_range)
    }

    pub fn with_http_client(
        http_client: Arc<dyn HttpClient>,
        history_range: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            auth: YahooAuthManager::default(),
            history_range: history_range.into(),
            chart: Mutex::new(None),
            summary: Mutex::new(None),
        }
    }

    async fn chart_data(&self, symbol: &Symbol) -> Result<Arc<ChartData>, FetchError> {
        if let Some(hit) = memo_get(&self.chart, symbol) {
            return hit;
        }

        let result = async {
            let body = self
                .get_authenticated(|crumb| {
                    format!(
                        "https://query1.finance.yahoo.com/v8/finance/chart/{}?range={}&interval=1d&events=div%7Csplit&crumb={}",
                        urlencoding::encode(symbol.as_str()),
                        urlencoding::encode(&self.history_range),
                        urlencoding::encode(crumb)
                    )
                })
                .await?;
            parse_chart(&body, symbol).map(Arc::new)
        }
        .await;

        memo_put(&self.chart, symbol, result.clone());
        result
    }

    async fn summary_data(&self, symbol: &Symbol) -> Result<Arc<SummaryData>, FetchError> {
        if let Some(hit) = memo_get(&self.summary, symbol) {
            return hit;
        }

        let result = async {
            let body = self
                .get_authenticated(|crumb| {
                    format!(
                        "https://query1.finance.yahoo.com/v10/finance/quoteSummary/{}?modules={}&crumb={}",
                        urlencoding::encode(symbol.as_str()),
                        SUMMARY_MODULES,
                        urlencoding::encode(crumb)
                    )
                })
                .await?;
            parse_summary(&body, symbol).map(Arc::new)
        }
        .await;

        memo_put(&self.summary, symbol, result.clone());
        result
    }

    /// GET with the current crumb; a 401 refreshes the crumb once.
    async fn get_authenticated(
        &self,
        url_for: impl Fn(&str) -> String,
    ) -> Result<String, FetchError> {
        let crumb = self.auth.crumb(self.http_client.as_ref()).await?;
        let response = self.send(url_for(&crumb)).await?;

        let response = if response.status == 401 {
            debug!("yahoo rejected crumb, refreshing");
            self.auth.invalidate();
            let crumb = self.auth.crumb(self.http_client.as_ref()).await?;
            self.send(url_for(&crumb)).await?
        } else {
            response
        };

        match response.status {
            status if (200..300).contains(&status) => Ok(response.body),
            404 => Err(FetchError::not_found("yahoo returned status 404")),
            status => Err(FetchError::unavailable(format!(
                "yahoo returned status {status}"
            ))),
        }
    }

    async fn send(&self, url: String) -> Result<HttpResponse, FetchError> {
        let request = HttpRequest::get(url).with_header("referer", REFERER);
        self.http_client
            .execute(request)
            .await
            .map_err(|e| FetchError::unavailable(format!("yahoo transport error: {}", e.message())))
    }
}

fn memo_get<T>(memo: &Memo<T>, symbol: &Symbol) -> Option<Result<Arc<T>, FetchError>> {
    let memo = memo.lock().unwrap_or_else(PoisonError::into_inner);
    memo.as_ref()
        .filter(|(cached, _)| cached == symbol)
        .map(|(_, result)| result.clone())
}

fn memo_put<T>(memo: &Memo<T>, symbol: &Symbol, result: Result<Arc<T>, FetchError>) {
    *memo.lock().unwrap_or_else(PoisonError::into_inner) = Some((symbol.clone(), result));
}

impl MarketDataSource for YahooSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, TickerProfile> {
        Box::pin(async move { Ok(self.summary_data(symbol).await?.profile.clone()) })
    }

    fn history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<DailyBar>> {
        Box::pin(async move { Ok(self.chart_data(symbol).await?.bars.clone()) })
    }

    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Dividend>> {
        Box::pin(async move { Ok(self.chart_data(symbol).await?.dividends.clone()) })
    }

    fn splits<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<Split>> {
        Box::pin(async move { Ok(self.chart_data(symbol).await?.splits.clone()) })
    }

    fn recommendations<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> SourceFuture<'a, Vec<RecommendationTrend>> {
        Box::pin(async move { Ok(self.summary_data(symbol).await?.recommendations.clone()) })
    }
}

// ============================================================================
// Chart parsing
// ============================================================================

fn parse_chart(body: &str, symbol: &Symbol) -> Result<ChartData, FetchError> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = response.chart.error {
        return Err(FetchError::not_found(format!(
            "yahoo chart error for {symbol}: {}",
            error.describe()
        )));
    }

    let result = response
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::not_found(format!("no chart data for {symbol}")))?;

    let offset = result.meta.and_then(|meta| meta.gmtoffset).unwrap_or(0);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::new();
    for (index, &timestamp) in result.timestamp.unwrap_or_default().iter().enumerate() {
        let bar = DailyBar {
            date: local_date(timestamp, offset)?,
            open: value_at(&quote.open, index),
            high: value_at(&quote.high, index),
            low: value_at(&quote.low, index),
            close: value_at(&quote.close, index),
            volume: value_at(&quote.volume, index),
        };
        if !bar.is_empty() {
            bars.push(bar);
        }
    }

    let events = result.events.unwrap_or_default();

    let mut dividends = events
        .dividends
        .into_values()
        .map(|event| {
            Ok(Dividend {
                date: local_date(event.date, offset)?,
                amount: event.amount.unwrap_or(0.0),
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;
    dividends.sort_by_key(|dividend| dividend.date);

    let mut splits = events
        .splits
        .into_values()
        .map(|event| {
            let ratio = match (event.numerator, event.denominator) {
                (Some(numerator), Some(denominator)) if denominator != 0.0 => {
                    numerator / denominator
                }
                _ => 0.0,
            };
            Ok(Split {
                date: local_date(event.date, offset)?,
                ratio,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;
    splits.sort_by_key(|split| split.date);

    Ok(ChartData {
        bars,
        dividends,
        splits,
    })
}

fn value_at<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}

/// Calendar date at the exchange, from a UTC timestamp and the exchange's
/// offset in seconds.
fn local_date(timestamp: i64, gmtoffset: i64) -> Result<Date, FetchError> {
    OffsetDateTime::from_unix_timestamp(timestamp.saturating_add(gmtoffset))
        .map(OffsetDateTime::date)
        .map_err(|e| FetchError::parse(format!("invalid timestamp {timestamp}: {e}")))
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("{code}: {description}"),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => String::from("unknown error"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    events: Option<YahooChartEvents>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartEvents {
    #[serde(default)]
    dividends: std::collections::BTreeMap<String, YahooDividendEvent>,
    #[serde(default)]
    splits: std::collections::BTreeMap<String, YahooSplitEvent>,
}

#[derive(Debug, Deserialize)]
struct YahooDividendEvent {
    #[serde(default)]
    amount: Option<f64>,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct YahooSplitEvent {
    date: i64,
    #[serde(default)]
    numerator: Option<f64>,
    #[serde(default)]
    denominator: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

// ============================================================================
// Quote summary parsing
// ============================================================================

fn parse_summary(body: &str, symbol: &Symbol) -> Result<SummaryData, FetchError> {
    let response: YahooQuoteSummaryResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(format!("failed to parse yahoo quote summary: {e}")))?;

    if let Some(error) = response.quote_summary.error {
        return Err(FetchError::not_found(format!(
            "yahoo quote summary error for {symbol}: {}",
            error.describe()
        )));
    }

    let result = response
        .quote_summary
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::not_found(format!("no quote summary for {symbol}")))?;

    let asset = result.asset_profile.unwrap_or_default();
    let price = result.price.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();
    let financial = result.financial_data.unwrap_or_default();
    let stats = result.default_key_statistics.unwrap_or_default();

    let profile = TickerProfile {
        long_name: price.long_name,
        short_name: price.short_name,
        business_summary: asset.long_business_summary,
        website: asset.website,
        phone: asset.phone,
        address: asset.address1,
        city: asset.city,
        state: asset.state,
        zip: asset.zip,
        country: asset.country,
        industry: asset.industry,
        sector: asset.sector,
        quote_type: price.quote_type,
        currency: price.currency,
        // Not part of the quote-summary modules.
        language: None,
        region: None,

        market_cap: raw(&price.market_cap).or_else(|| raw(&detail.market_cap)),
        fifty_day_average: raw(&detail.fifty_day_average),
        two_hundred_day_average: raw(&detail.two_hundred_day_average),
        fifty_two_week_change_percent: raw(&stats.fifty_two_week_change).map(|change| change * 100.0),

        total_cash: raw(&financial.total_cash),
        total_debt: raw(&financial.total_debt),
        total_revenue: raw(&financial.total_revenue),
        profit_margins: raw(&financial.profit_margins),
        gross_profits: raw(&financial.gross_profits),
        free_cash_flow: raw(&financial.free_cashflow),
        operating_cash_flow: raw(&financial.operating_cashflow),
        revenue_growth: raw(&financial.revenue_growth),
        ebitda: raw(&financial.ebitda),
        net_income_to_common: raw(&stats.net_income_to_common),
        financial_currency: financial.financial_currency,
        price_to_sales_ttm: raw(&detail.price_to_sales_trailing12_months),
        enterprise_to_revenue: raw(&stats.enterprise_to_revenue),
        enterprise_to_ebitda: raw(&stats.enterprise_to_ebitda),
        trailing_pe: raw(&detail.trailing_pe),
        forward_pe: raw(&detail.forward_pe),
        price_to_book: raw(&stats.price_to_book),
        debt_to_equity: raw(&financial.debt_to_equity),
        return_on_assets: raw(&financial.return_on_assets),
        return_on_equity: raw(&financial.return_on_equity),
        trailing_eps: raw(&stats.trailing_eps),
        forward_eps: raw(&stats.forward_eps),

        recommendation_mean: raw(&financial.recommendation_mean),
        analyst_count: raw(&financial.number_of_analyst_opinions),
        target_mean_price: raw(&financial.target_mean_price),
    };

    let recommendations = result
        .recommendation_trend
        .map(|trend| trend.trend)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| RecommendationTrend {
            period: entry.period,
            strong_buy: entry.strong_buy,
            buy: entry.buy,
            hold: entry.hold,
            sell: entry.sell,
            strong_sell: entry.strong_sell,
        })
        .collect();

    Ok(SummaryData {
        profile,
        recommendations,
    })
}

fn raw(value: &Option<YahooRawValue>) -> Option<f64> {
    value.as_ref().and_then(YahooRawValue::to_option)
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: YahooQuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<YahooQuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuoteSummaryResult {
    #[serde(default)]
    asset_profile: Option<YahooAssetProfile>,
    #[serde(default)]
    price: Option<YahooPriceData>,
    #[serde(default)]
    summary_detail: Option<YahooSummaryDetailData>,
    #[serde(default)]
    financial_data: Option<YahooFinancialData>,
    #[serde(default)]
    default_key_statistics: Option<YahooDefaultKeyStatisticsData>,
    #[serde(default)]
    recommendation_trend: Option<YahooRecommendationTrend>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooAssetProfile {
    long_business_summary: Option<String>,
    website: Option<String>,
    phone: Option<String>,
    address1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    country: Option<String>,
    industry: Option<String>,
    sector: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooPriceData {
    long_name: Option<String>,
    short_name: Option<String>,
    quote_type: Option<String>,
    currency: Option<String>,
    market_cap: Option<YahooRawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooSummaryDetailData {
    market_cap: Option<YahooRawValue>,
    fifty_day_average: Option<YahooRawValue>,
    two_hundred_day_average: Option<YahooRawValue>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<YahooRawValue>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<YahooRawValue>,
    price_to_sales_trailing12_months: Option<YahooRawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooFinancialData {
    total_cash: Option<YahooRawValue>,
    total_debt: Option<YahooRawValue>,
    total_revenue: Option<YahooRawValue>,
    profit_margins: Option<YahooRawValue>,
    gross_profits: Option<YahooRawValue>,
    free_cashflow: Option<YahooRawValue>,
    operating_cashflow: Option<YahooRawValue>,
    revenue_growth: Option<YahooRawValue>,
    ebitda: Option<YahooRawValue>,
    financial_currency: Option<String>,
    debt_to_equity: Option<YahooRawValue>,
    return_on_assets: Option<YahooRawValue>,
    return_on_equity: Option<YahooRawValue>,
    recommendation_mean: Option<YahooRawValue>,
    number_of_analyst_opinions: Option<YahooRawValue>,
    target_mean_price: Option<YahooRawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooDefaultKeyStatisticsData {
    enterprise_to_revenue: Option<YahooRawValue>,
    enterprise_to_ebitda: Option<YahooRawValue>,
    price_to_book: Option<YahooRawValue>,
    net_income_to_common: Option<YahooRawValue>,
    trailing_eps: Option<YahooRawValue>,
    forward_eps: Option<YahooRawValue>,
    #[serde(rename = "52WeekChange")]
    fifty_two_week_change: Option<YahooRawValue>,
}

#[derive(Debug, Deserialize)]
struct YahooRecommendationTrend {
    #[serde(default)]
    trend: Vec<YahooTrendEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooTrendEntry {
    period: String,
    #[serde(default)]
    strong_buy: Option<i64>,
    #[serde(default)]
    buy: Option<i64>,
    #[serde(default)]
    hold: Option<i64>,
    #[serde(default)]
    sell: Option<i64>,
    #[serde(default)]
    strong_sell: Option<i64>,
}

/// Yahoo returns some numeric values with extra metadata in a wrapper object.
/// We use a helper to extract the raw f64 value.
#[derive(Debug, Clone, Default, Deserialize)]
struct YahooRawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl YahooRawValue {
    fn to_option(&self) -> Option<f64> {
        self.raw.filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::HttpError;
    use std::future::Future;
    use std::pin::Pin;
    use time::Month;

    /// Answers each request with the first route whose pattern occurs in the
    /// URL, and records every request.
    struct ScriptedHttpClient {
        routes: Vec<(&'static str, Result<HttpResponse, HttpError>)>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(routes: Vec<(&'static str, Result<HttpResponse, HttpError>)>) -> Self {
            let mut all = vec![
                ("fc.yahoo.com", Ok(HttpResponse::with_status(404, ""))),
                ("getcrumb", Ok(HttpResponse::ok_json("crumb-123"))),
            ];
            all.extend(routes);
            Self {
                routes: all,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn urls_containing(&self, pattern: &str) -> Vec<String> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .iter()
                .filter(|request| request.url.contains(pattern))
                .map(|request| request.url.clone())
                .collect()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let response = self
                .routes
                .iter()
                .find(|(pattern, _)| request.url.contains(pattern))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "")));
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            Box::pin(async move { response })
        }
    }

    // 2024-01-02 08:00 UTC and 2024-01-03 08:00 UTC; one empty row between.
    const CHART: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"gmtoffset": 3600},
          "timestamp": [1704182400, 1704225600, 1704268800],
          "events": {
            "dividends": {"1704268800": {"amount": 0.0975, "date": 1704268800}},
            "splits": {"1704182400": {"date": 1704182400, "numerator": 3, "denominator": 2}}
          },
          "indicators": {"quote": [{
            "open":   [3.501, null, 3.6],
            "high":   [3.7,   null, 3.65],
            "low":    [3.45,  null, null],
            "close":  [3.66,  null, 3.61],
            "volume": [1200,  null, 900]
          }]}
        }],
        "error": null
      }
    }"#;

    const SUMMARY: &str = r#"{
      "quoteSummary": {
        "result": [{
          "assetProfile": {"city": "Santander", "country": "Spain", "sector": "Financial Services"},
          "price": {"longName": "Banco Santander, S.A.", "shortName": "SANTANDER", "currency": "EUR",
                    "quoteType": "EQUITY", "marketCap": {"raw": 6.1e10, "fmt": "61B"}},
          "summaryDetail": {"fiftyDayAverage": {"raw": 3.7}, "trailingPE": {}},
          "financialData": {"financialCurrency": "EUR", "recommendationMean": {"raw": 2.1},
                            "numberOfAnalystOpinions": {"raw": 21}, "targetMeanPrice": {"raw": 4.56}},
          "defaultKeyStatistics": {"52WeekChange": {"raw": 0.125}, "forwardEps": {"raw": 0.8}},
          "recommendationTrend": {"trend": [
            {"period": "0m", "strongBuy": 5, "buy": 10, "hold": 6, "sell": 1, "strongSell": 0},
            {"period": "-1m", "strongBuy": 4, "buy": 11, "hold": 6, "sell": 1}
          ]}
        }],
        "error": null
      }
    }"#;

    fn symbol() -> Symbol {
        Symbol::parse("SAN.MC").expect("valid symbol")
    }

    fn jan(day: u8) -> Date {
        Date::from_calendar_date(2024, Month::January, day).expect("valid date")
    }

    fn source(client: &Arc<ScriptedHttpClient>) -> YahooSource {
        YahooSource::with_http_client(client.clone(), "10y")
    }

    #[tokio::test]
    async fn history_skips_empty_rows_and_keeps_missing_fields() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::ok_json(CHART)),
        )]));
        let bars = source(&client).history(&symbol()).await.expect("history");

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, jan(2));
        assert_eq!(bars[0].open, Some(3.501));
        assert_eq!(bars[1].date, jan(3));
        assert_eq!(bars[1].low, None);
        assert_eq!(bars[1].volume, Some(900));
    }

    #[tokio::test]
    async fn chart_is_downloaded_once_per_symbol() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::ok_json(CHART)),
        )]));
        let source = source(&client);
        let symbol = symbol();

        source.history(&symbol).await.expect("history");
        let dividends = source.dividends(&symbol).await.expect("dividends");
        let splits = source.splits(&symbol).await.expect("splits");

        assert_eq!(client.urls_containing("/v8/finance/chart/").len(), 1);
        assert_eq!(
            dividends,
            vec![Dividend {
                date: jan(3),
                amount: 0.0975
            }]
        );
        assert_eq!(
            splits,
            vec![Split {
                date: jan(2),
                ratio: 1.5
            }]
        );
    }

    #[tokio::test]
    async fn requests_carry_crumb_and_history_range() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::ok_json(CHART)),
        )]));
        source(&client).history(&symbol()).await.expect("history");

        let urls = client.urls_containing("/v8/finance/chart/");
        assert!(urls[0].contains("SAN.MC"));
        assert!(urls[0].contains("range=10y"));
        assert!(urls[0].contains("events=div%7Csplit"));
        assert!(urls[0].contains("crumb=crumb-123"));
        assert_eq!(client.urls_containing("getcrumb").len(), 1);
    }

    #[tokio::test]
    async fn profile_maps_summary_modules() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v10/finance/quoteSummary/",
            Ok(HttpResponse::ok_json(SUMMARY)),
        )]));
        let profile = source(&client).profile(&symbol()).await.expect("profile");

        assert_eq!(profile.long_name.as_deref(), Some("Banco Santander, S.A."));
        assert_eq!(profile.city.as_deref(), Some("Santander"));
        assert_eq!(profile.market_cap, Some(6.1e10));
        assert_eq!(profile.fifty_day_average, Some(3.7));
        assert_eq!(profile.trailing_pe, None);
        assert_eq!(profile.fifty_two_week_change_percent, Some(12.5));
        assert_eq!(profile.analyst_count, Some(21.0));
        assert_eq!(profile.website, None);
        assert_eq!(profile.language, None);
    }

    #[tokio::test]
    async fn recommendations_share_the_summary_download() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v10/finance/quoteSummary/",
            Ok(HttpResponse::ok_json(SUMMARY)),
        )]));
        let source = source(&client);
        let symbol = symbol();

        source.profile(&symbol).await.expect("profile");
        let trend = source.recommendations(&symbol).await.expect("trend");

        assert_eq!(client.urls_containing("quoteSummary").len(), 1);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].period, "0m");
        assert_eq!(trend[0].buy, Some(10));
        assert_eq!(trend[1].strong_sell, None);
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v8/finance/chart/",
            Ok(HttpResponse::with_status(
                404,
                r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
            )),
        )]));
        let error = source(&client)
            .history(&symbol())
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failures_are_memoized_too() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v8/finance/chart/",
            Err(HttpError::new("upstream timeout")),
        )]));
        let source = source(&client);
        let symbol = symbol();

        let first = source.history(&symbol).await.expect_err("history fails");
        let second = source.splits(&symbol).await.expect_err("splits fail");

        assert_eq!(first.kind(), FetchErrorKind::Unavailable);
        assert_eq!(first, second);
        assert_eq!(client.urls_containing("/v8/finance/chart/").len(), 1);
    }

    #[tokio::test]
    async fn garbage_body_is_a_parse_error() {
        let client = Arc::new(ScriptedHttpClient::new(vec![(
            "/v10/finance/quoteSummary/",
            Ok(HttpResponse::ok_json("<html>oops</html>")),
        )]));
        let error = source(&client)
            .profile(&symbol())
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::Parse);
    }
}
