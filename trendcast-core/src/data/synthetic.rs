//! Synthetic sources for offline development and tests.
//!
//! Both sources are deterministic random walks seeded from their symbol or
//! keywords, anchored at a fixed origin date so overlapping requests always
//! see the same underlying history. The trend source re-normalises every
//! query to a peak of 100, like the live service, so stitching its output
//! exercises the same rescaling path as real data.

use super::provider::{
    normalize_to_100, PriceBar, PriceSource, SourceError, TrendQueryWindow, TrendRow, TrendSource,
};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn origin() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

fn rng_for(label: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(label.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

/// Walk a positive level from the origin up to `to`, calling `emit` for each
/// day at or after `from`.
fn walk(
    label: &str,
    start: f64,
    step: f64,
    from: NaiveDate,
    to: NaiveDate,
    mut emit: impl FnMut(NaiveDate, f64),
) {
    let mut rng = rng_for(label);
    let mut level = start;
    let mut current = origin();
    while current <= to {
        level *= 1.0 + rng.gen_range(-step..step);
        if current >= from {
            emit(current, level);
        }
        current += Duration::days(1);
    }
}

/// Daily random-walk prices starting at 100.0 on the origin date.
#[derive(Debug, Clone)]
pub struct SyntheticPriceSource {
    symbol: String,
}

impl SyntheticPriceSource {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl PriceSource for SyntheticPriceSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceBar>, SourceError> {
        if from < origin() {
            return Err(SourceError::Other(format!(
                "synthetic prices start at {}",
                origin()
            )));
        }
        let mut bars = Vec::new();
        walk(&self.symbol, 100.0, 0.03, from, to, |date, close| {
            // Per-day noise keeps bars identical whatever range is requested
            let mut rng = rng_for(&format!("{}:{date}", self.symbol));
            let open = close / (1.0 + rng.gen_range(-0.01..0.01));
            bars.push(PriceBar {
                date,
                open,
                high: open.max(close) * (1.0 + rng.gen_range(0.0..0.01)),
                low: open.min(close) * (1.0 - rng.gen_range(0.0..0.01)),
                close,
                volume: rng.gen_range(1.0e8..1.0e10),
            });
        });
        Ok(bars)
    }
}

/// Daily search interest for any keyword set, re-normalised per query.
#[derive(Debug, Clone, Default)]
pub struct SyntheticTrendSource {
    round_to_integers: bool,
    partial_from: Option<NaiveDate>,
}

impl SyntheticTrendSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Round every returned value to an integer, as the live service does.
    pub fn round_to_integers(mut self, enabled: bool) -> Self {
        self.round_to_integers = enabled;
        self
    }

    /// Flag dates on or after `date` as still accumulating.
    pub fn partial_from(mut self, date: NaiveDate) -> Self {
        self.partial_from = Some(date);
        self
    }

    /// The un-normalised interest levels behind every query.
    pub fn true_levels(&self, keywords: &[String], from: NaiveDate, to: NaiveDate) -> Vec<TrendRow> {
        let mut columns: Vec<Vec<(NaiveDate, f64)>> = Vec::with_capacity(keywords.len());
        for kw in keywords {
            let mut col = Vec::new();
            walk(kw, 50.0, 0.05, from, to, |date, level| col.push((date, level)));
            columns.push(col);
        }

        let n = columns.first().map_or(0, Vec::len);
        (0..n)
            .map(|i| TrendRow {
                date: columns[0][i].0,
                values: columns.iter().map(|c| c[i].1).collect(),
                is_partial: self.partial_from.is_some_and(|p| columns[0][i].0 >= p),
            })
            .collect()
    }
}

impl TrendSource for SyntheticTrendSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn query(&self, window: &TrendQueryWindow) -> Result<Vec<TrendRow>, SourceError> {
        let start = window.start.max(origin());
        let mut rows = self.true_levels(&window.keywords, start, window.end);
        normalize_to_100(&mut rows);
        if self.round_to_integers {
            for v in rows.iter_mut().flat_map(|r| r.values.iter_mut()) {
                *v = v.round();
            }
        }
        Ok(rows)
    }
}
