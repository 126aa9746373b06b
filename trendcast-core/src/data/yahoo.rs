//! Yahoo Finance price source.
//!
//! Fetches daily bars from Yahoo's v8 chart API (e.g. `BTC-USD`). Transient
//! failures are retried inside this client with exponential backoff; a shared
//! circuit breaker stops it from hammering the service after a ban. Whatever
//! error survives the retries is returned to the pipeline unchanged.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{PriceBar, PriceSource, SourceError};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

pub struct YahooPriceSource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    symbol: String,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooPriceSource {
    pub fn new(
        symbol: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            symbol: symbol.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Point the client at a different chart endpoint (mirrors, local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn chart_url(&self, from: NaiveDate, to: NaiveDate) -> String {
        let start_ts = from.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end_ts = to.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;
        format!(
            "{}/{}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url, self.symbol
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, SourceError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                SourceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => SourceError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("result array is empty".into()))?;
        let timestamps = data
            .timestamp
            .ok_or_else(|| SourceError::ResponseFormatChanged("no timestamps".into()))?;
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    SourceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            // A day without a close is useless downstream
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            let field = |v: &[Option<f64>]| v.get(i).copied().flatten().unwrap_or(f64::NAN);

            bars.push(PriceBar {
                date,
                open: field(&quote.open),
                high: field(&quote.high),
                low: field(&quote.low),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
            });
        }

        if bars.is_empty() {
            return Err(SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn fetch_with_retry(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceBar>, SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(SourceError::CircuitBreakerTripped);
        }

        let url = self.chart_url(from, to);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                log::warn!(
                    "retrying {} (attempt {attempt}/{}) in {delay:?}",
                    self.symbol,
                    self.max_retries
                );
                std::thread::sleep(delay);
                if !self.circuit_breaker.is_allowed() {
                    return Err(SourceError::CircuitBreakerTripped);
                }
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(SourceError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(SourceError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(SourceError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(SourceError::Other(format!(
                    "HTTP {status} for {}",
                    self.symbol
                )));
                continue;
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                SourceError::ResponseFormatChanged(format!(
                    "failed to parse response for {}: {e}",
                    self.symbol
                ))
            })?;
            let bars = Self::parse_response(&self.symbol, chart)?;
            self.circuit_breaker.record_success();
            return Ok(bars);
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

impl PriceSource for YahooPriceSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceBar>, SourceError> {
        let bars = self.fetch_with_retry(from, to)?;
        log::info!("fetched {} bars for {} from Yahoo", bars.len(), self.symbol);
        Ok(bars)
    }
}
