//! Data source traits and structured error types.
//!
//! The pipeline never talks to the network directly. Price history and
//! search-interest history come in through [`PriceSource`] and [`TrendSource`]
//! so the live clients can be swapped for CSV replay or synthetic sources,
//! and mocked in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of keywords a single trend query may carry.
pub const MAX_KEYWORDS: usize = 5;

/// Maximum span, in days, of a single trend query window.
pub const MAX_WINDOW_DAYS: i64 = 270;

/// Raw daily price bar from a price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One day of search-interest values, one value per queried keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
    /// The source is still accumulating data for this date.
    pub is_partial: bool,
}

/// A single bounded trend query: inclusive date range plus ordered keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendQueryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub keywords: Vec<String>,
}

impl TrendQueryWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, keywords: &[String]) -> Self {
        Self {
            start,
            end,
            keywords: keywords.to_vec(),
        }
    }

    /// Span of the window in days (`end - start`).
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Whether `date` falls inside the window (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Timeframe string in the `start end` form trend services expect.
    pub fn timeframe(&self) -> String {
        format!(
            "{} {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Structured error types for data source operations.
///
/// These are designed to be displayable in CLI output and to pass through
/// the pipeline unchanged.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("data source error: {0}")]
    Other(String),
}

impl From<csv::Error> for SourceError {
    fn from(e: csv::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    CsvReplay,
    Synthetic,
}

/// Rescale rows in place so the largest finite value across all keywords is 100.
/// Rows are left untouched when that maximum is not positive.
pub(crate) fn normalize_to_100(rows: &mut [TrendRow]) {
    let max = rows
        .iter()
        .flat_map(|r| r.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        for row in rows.iter_mut() {
            for v in row.values.iter_mut() {
                *v = *v * 100.0 / max;
            }
        }
    }
}

/// A source of daily price history.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily bars covering `[from, to]`. Order is not guaranteed.
    fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceBar>, SourceError>;
}

/// A source of daily search-interest history.
///
/// Every call is normalised independently by the source (its own 0-100
/// scale), so values from two different queries are not comparable.
pub trait TrendSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Run one bounded query. Each returned row has one value per keyword,
    /// in the window's keyword order. An empty result means no data.
    fn query(&self, window: &TrendQueryWindow) -> Result<Vec<TrendRow>, SourceError>;
}
