use crate::cache::SeriesCache;
use crate::calendar::days_before;
use crate::config;
use crate::error::ScanError;
use crate::models::{PriceBar, PriceSeries};
use chrono::{DateTime, NaiveDate};
use futures::StreamExt;
use rand::{seq::SliceRandom, thread_rng};
use reqwest::{Client, header};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

/// Source of daily bars for a symbol over `[start, end]`.
pub trait PriceHistoryProvider {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<PriceSeries, ScanError>> + Send;
}

// -----------------------------------------------
// JSON DIRECTORY
// -----------------------------------------------

/// Reads `{dir}/{SYMBOL}.json`, an array of bars.
#[derive(Debug, Clone)]
pub struct JsonDirProvider {
    dir: PathBuf,
}

impl JsonDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }
}

impl PriceHistoryProvider for JsonDirProvider {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, ScanError> {
        let path = self.path_for(symbol);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::EmptyHistory(symbol.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bars: Vec<PriceBar> = serde_json::from_str(&raw)?;
        let series = PriceSeries::from_unsorted(
            bars.into_iter()
                .filter(|b| b.date >= start && b.date <= end)
                .collect(),
        )?;

        if series.is_empty() {
            return Err(ScanError::EmptyHistory(symbol.to_string()));
        }
        Ok(series)
    }
}

// -----------------------------------------------
// HTTP CANDLE ENDPOINT
// -----------------------------------------------

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    s: String,
    #[serde(default)]
    candles: Vec<[f64; 6]>,
    #[serde(default)]
    message: Option<String>,
}

/// Daily candles over HTTP, fetched in year-sized chunks walking back from
/// the end date with a fixed pause between requests.
pub struct HttpCandleProvider {
    client: Client,
    base_url: String,
    symbol_template: String,
    access_token: Option<String>,
    request_delay: Duration,
}

impl HttpCandleProvider {
    pub fn new(
        base_url: impl Into<String>,
        symbol_template: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, ScanError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            symbol_template: symbol_template.into(),
            access_token,
            request_delay: Duration::from_millis(config::REQUEST_DELAY_MS),
        })
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    fn ticker(&self, symbol: &str) -> String {
        self.symbol_template.replace("{symbol}", symbol)
    }

    /// One request, retried with exponential backoff.
    async fn fetch_chunk(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<HistoryResponse, ScanError> {
        let url = config::history_url(&self.base_url, ticker, from, to);

        let backoff = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        let body = Retry::spawn(backoff, || async {
            let mut req = self.client.get(&url);
            if let Some(token) = &self.access_token {
                req = req.bearer_auth(token);
            }

            let res = req.send().await?;
            let status = res.status();
            if !status.is_success() {
                return Err(ScanError::Request(format!("HTTP {} for {}", status.as_u16(), url)));
            }
            Ok(res.text().await?)
        })
        .await?;

        Ok(serde_json::from_str(&body)?)
    }
}

impl PriceHistoryProvider for HttpCandleProvider {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, ScanError> {
        let ticker = self.ticker(symbol);
        let mut candles = Vec::new();
        let mut current = end;

        while current >= start {
            let chunk_start = days_before(current, (config::HISTORY_CHUNK_DAYS - 1) as u64)
                .map_or(start, |d| d.max(start));

            let response = self.fetch_chunk(&ticker, chunk_start, current).await?;
            if response.s == "ok" {
                debug!(%ticker, from = %chunk_start, to = %current, count = response.candles.len(), "chunk received");
                candles.extend(response.candles);
            } else {
                warn!(%ticker, status = %response.s, message = ?response.message, "history chunk rejected");
            }

            current = match chunk_start.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
            tokio::time::sleep(self.request_delay).await;
        }

        let series = parse_candles(&candles)?;
        if series.is_empty() {
            return Err(ScanError::EmptyHistory(symbol.to_string()));
        }
        Ok(series)
    }
}

/// Turn `[epoch_secs, open, high, low, close, volume]` rows into a series
/// dated in exchange-local time.
pub fn parse_candles(candles: &[[f64; 6]]) -> Result<PriceSeries, ScanError> {
    let mut bars = Vec::with_capacity(candles.len());

    for &[ts, open, high, low, close, volume] in candles {
        let Some(utc) = DateTime::from_timestamp(ts as i64, 0) else {
            debug!(ts, "candle timestamp out of range");
            continue;
        };
        if !close.is_finite() || close <= 0.0 {
            debug!(ts, close, "candle with unusable close");
            continue;
        }
        bars.push(PriceBar {
            date: utc.with_timezone(&config::EXCHANGE_TZ).date_naive(),
            open,
            high,
            low,
            close,
            volume,
        });
    }

    PriceSeries::from_unsorted(bars)
}

fn build_client() -> Result<Client, ScanError> {
    let mut headers = header::HeaderMap::new();

    let lang = config::ACCEPT_LANGUAGES
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or("en-IN,en;q=0.9");
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_str(lang).map_err(|e| ScanError::Request(e.to_string()))?,
    );
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    Ok(Client::builder()
        .default_headers(headers)
        .user_agent(config::USER_AGENT)
        .timeout(config::HTTP_TIMEOUT)
        .build()?)
}

// -----------------------------------------------
// CONFIGURED SOURCE
// -----------------------------------------------

/// Whichever provider the configuration selects.
pub enum HistorySource {
    Dir(JsonDirProvider),
    Http(HttpCandleProvider),
}

impl PriceHistoryProvider for HistorySource {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, ScanError> {
        match self {
            HistorySource::Dir(p) => p.fetch(symbol, start, end).await,
            HistorySource::Http(p) => p.fetch(symbol, start, end).await,
        }
    }
}

/// Outcome of filling a cache for a list of symbols.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchSummary {
    pub fetched: usize,
    pub reused: usize,
    pub failed: Vec<(String, String)>,
}

/// Fetch every symbol not already cached for `cutoff_date`, one at a time.
/// Failures are recorded and the loop carries on.
pub async fn fill_cache<P: PriceHistoryProvider>(
    provider: &P,
    cache: &mut SeriesCache,
    symbols: &[String],
    cutoff_date: NaiveDate,
) -> FetchSummary {
    let start = days_before(cutoff_date, config::HISTORY_WINDOW_DAYS as u64).unwrap_or(cutoff_date);
    let mut summary = FetchSummary::default();

    let pending = cache.missing(symbols, cutoff_date);
    summary.reused = symbols.len() - pending.len();

    // insert as results arrive so a caller-side timeout keeps finished symbols
    let mut results = std::pin::pin!(futures::stream::iter(pending).then(move |symbol: String| async move {
        let result = provider.fetch(&symbol, start, cutoff_date).await;
        (symbol, result)
    }));

    while let Some((symbol, result)) = results.next().await {
        match result {
            Ok(series) => {
                cache.insert(symbol, cutoff_date, series);
                summary.fetched += 1;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "history unavailable");
                summary.failed.push((symbol, e.to_string()));
            }
        }
    }

    info!(
        fetched = summary.fetched,
        reused = summary.reused,
        failed = summary.failed.len(),
        "history fetch complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_candles_uses_exchange_date() {
        // 2025-12-11T22:30:00Z is 2025-12-12 04:00 in Kolkata
        let candles = [
            [1765492200.0, 10.0, 11.0, 9.0, 10.5, 1000.0],
            [1765405800.0, 9.0, 10.0, 8.0, 9.5, 900.0],
            [1765405800.0, 9.0, 10.0, 8.0, 0.0, 900.0],
        ];
        let series = parse_candles(&candles).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last_date(), Some(d(2025, 12, 12)));
        assert_eq!(series.bars()[0].close, 9.5);
    }

    #[tokio::test]
    async fn test_json_dir_provider_filters_range() {
        let dir = tempfile::tempdir().unwrap();
        let bars = vec![
            PriceBar::from_close(d(2025, 12, 10), 10.0),
            PriceBar::from_close(d(2025, 12, 11), 11.0),
            PriceBar::from_close(d(2025, 12, 12), 12.0),
        ];
        std::fs::write(dir.path().join("TCS.json"), serde_json::to_string(&bars).unwrap()).unwrap();

        let provider = JsonDirProvider::new(dir.path());
        let series = provider.fetch("TCS", d(2025, 12, 11), d(2025, 12, 12)).await.unwrap();
        assert_eq!(series.len(), 2);

        let missing = provider.fetch("INFY", d(2025, 12, 1), d(2025, 12, 12)).await;
        assert!(matches!(missing, Err(ScanError::EmptyHistory(_))));
    }

    #[tokio::test]
    async fn test_fill_cache_reuses_and_records_failures() {
        let dir = tempfile::tempdir().unwrap();
        let bars = vec![
            PriceBar::from_close(d(2025, 12, 11), 11.0),
            PriceBar::from_close(d(2025, 12, 12), 12.0),
        ];
        std::fs::write(dir.path().join("TCS.json"), serde_json::to_string(&bars).unwrap()).unwrap();
        std::fs::write(dir.path().join("ITC.json"), serde_json::to_string(&bars).unwrap()).unwrap();

        let provider = JsonDirProvider::new(dir.path());
        let cutoff = d(2025, 12, 12);
        let mut cache = SeriesCache::new(cutoff);
        cache.insert("ITC", cutoff, PriceSeries::from_closes([(cutoff, 5.0)]).unwrap());

        let symbols = vec!["TCS".to_string(), "ITC".to_string(), "NOPE".to_string()];
        let summary = fill_cache(&provider, &mut cache, &symbols, cutoff).await;

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.reused, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "NOPE");
        // cached entry was not refetched
        assert_eq!(cache.get("ITC", cutoff).unwrap().len(), 1);
    }

    mod http {
        use super::*;
        use mockito::Matcher;
        use serde_json::json;

        fn range(from: &str, to: &str) -> Matcher {
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "NSE:TCS-EQ".into()),
                Matcher::UrlEncoded("range_from".into(), from.into()),
                Matcher::UrlEncoded("range_to".into(), to.into()),
            ])
        }

        // 04:00 UTC is mid-morning in Kolkata, same calendar day
        fn candle(date: NaiveDate, close: f64) -> serde_json::Value {
            let ts = date.and_hms_opt(4, 0, 0).unwrap().and_utc().timestamp();
            json!([ts, close, close, close, close, 1000])
        }

        fn provider(url: String) -> HttpCandleProvider {
            HttpCandleProvider::new(url, "NSE:{symbol}-EQ", Some("secret".to_string()))
                .unwrap()
                .with_request_delay(Duration::ZERO)
        }

        #[tokio::test]
        async fn test_walks_back_in_year_chunks_with_bearer_token() {
            let mut server = mockito::Server::new_async().await;

            let recent = server
                .mock("GET", "/history")
                .match_query(range("2024-12-13", "2025-12-12"))
                .match_header("authorization", "Bearer secret")
                .with_status(200)
                .with_body(
                    json!({"s": "ok", "candles": [candle(d(2025, 12, 11), 110.0), candle(d(2025, 12, 12), 112.0)]})
                        .to_string(),
                )
                .expect(1)
                .create_async()
                .await;
            let middle = server
                .mock("GET", "/history")
                .match_query(range("2023-12-14", "2024-12-12"))
                .match_header("authorization", "Bearer secret")
                .with_status(200)
                .with_body(json!({"s": "ok", "candles": [candle(d(2024, 6, 3), 100.0)]}).to_string())
                .expect(1)
                .create_async()
                .await;
            // clamped to the requested start
            let oldest = server
                .mock("GET", "/history")
                .match_query(range("2023-06-01", "2023-12-13"))
                .match_header("authorization", "Bearer secret")
                .with_status(200)
                .with_body(json!({"s": "error", "message": "no_data"}).to_string())
                .expect(1)
                .create_async()
                .await;

            let series = provider(server.url())
                .fetch("TCS", d(2023, 6, 1), d(2025, 12, 12))
                .await
                .unwrap();

            recent.assert_async().await;
            middle.assert_async().await;
            oldest.assert_async().await;

            let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
            assert_eq!(closes, vec![100.0, 110.0, 112.0]);
            assert_eq!(series.last_date(), Some(d(2025, 12, 12)));
        }

        #[tokio::test]
        async fn test_only_rejected_chunks_is_empty_history() {
            let mut server = mockito::Server::new_async().await;
            let rejected = server
                .mock("GET", "/history")
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(json!({"s": "error", "message": "invalid symbol"}).to_string())
                .expect(1)
                .create_async()
                .await;

            let result = provider(server.url()).fetch("TCS", d(2025, 12, 1), d(2025, 12, 12)).await;

            rejected.assert_async().await;
            assert!(matches!(result, Err(ScanError::EmptyHistory(s)) if s == "TCS"));
        }

        #[tokio::test]
        async fn test_http_failure_is_retried_then_reported() {
            let mut server = mockito::Server::new_async().await;
            let failing = server
                .mock("GET", "/history")
                .match_query(Matcher::Any)
                .with_status(500)
                .expect(config::RETRY_MAX_ATTEMPTS + 1)
                .create_async()
                .await;

            let result = provider(server.url()).fetch("TCS", d(2025, 12, 1), d(2025, 12, 12)).await;

            failing.assert_async().await;
            assert!(matches!(result, Err(ScanError::Request(msg)) if msg.contains("HTTP 500")));
        }
    }
}
