//! Price/trend alignment and log-difference features.
//!
//! The two series are inner-joined on date. Dates present on only one side
//! are dropped silently; this is an accepted lossy step, since a day without
//! both a close and a trend value cannot produce a feature row.

use crate::data::provider::PriceBar;
use crate::error::{PipelineError, Result};
use crate::stitch::TrendFrame;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const LOG_RETURNS: &str = "log_returns";
pub const LOG_TREND_CHG: &str = "log_trend_chg";

/// One aligned day: log-differences of price and trend against the previous aligned day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub date: NaiveDate,
    pub log_return: f64,
    pub log_trend_chg: f64,
}

/// Aligned log-difference series, ascending by date, no missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedSeries {
    pub rows: Vec<AlignedRow>,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Rows as `[log_return, log_trend_chg]` vectors, ready for windowing.
    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|r| vec![r.log_return, r.log_trend_chg])
            .collect()
    }

    /// The most recent `n` rows (all of them if shorter).
    pub fn tail(&self, n: usize) -> AlignedSeries {
        let start = self.rows.len().saturating_sub(n);
        AlignedSeries {
            rows: self.rows[start..].to_vec(),
        }
    }
}

/// Align raw price bars with one keyword column of a stitched trend frame.
pub fn align(prices: &[PriceBar], trend: &TrendFrame, keyword: &str) -> Result<AlignedSeries> {
    let trend_levels = trend.series(keyword).ok_or_else(|| {
        PipelineError::validation(format!(
            "keyword '{keyword}' is not a column of the trend frame {:?}",
            trend.keywords
        ))
    })?;
    let closes: Vec<(NaiveDate, f64)> = prices.iter().map(|b| (b.date, b.close)).collect();
    align_levels(&closes, &trend_levels)
}

/// Inner-join two `(date, level)` series and take log-differences of both.
///
/// Input order does not matter; output is ascending. The first joined date
/// has no predecessor and is dropped, so the result has
/// `|price_dates ∩ trend_dates| - 1` rows.
pub fn align_levels(prices: &[(NaiveDate, f64)], trend: &[(NaiveDate, f64)]) -> Result<AlignedSeries> {
    let price_by_date = index_unique(prices, "price")?;
    let trend_by_date = index_unique(trend, "trend")?;

    let joined: BTreeMap<NaiveDate, (f64, f64)> = price_by_date
        .iter()
        .filter_map(|(date, &p)| trend_by_date.get(date).map(|&t| (*date, (p, t))))
        .collect();

    let dropped = prices.len().max(trend.len()) - joined.len();
    if dropped > 0 {
        log::debug!("inner join dropped {dropped} unmatched date(s)");
    }

    for (date, (p, t)) in &joined {
        ensure_positive(*p, "close", *date)?;
        ensure_positive(*t, "trend", *date)?;
    }

    let levels: Vec<(NaiveDate, f64, f64)> = joined.into_iter().map(|(d, (p, t))| (d, p, t)).collect();
    let rows = levels
        .windows(2)
        .map(|pair| {
            let (_, p0, t0) = pair[0];
            let (date, p1, t1) = pair[1];
            AlignedRow {
                date,
                log_return: p1.ln() - p0.ln(),
                log_trend_chg: t1.ln() - t0.ln(),
            }
        })
        .collect();

    Ok(AlignedSeries { rows })
}

fn index_unique(series: &[(NaiveDate, f64)], name: &str) -> Result<HashMap<NaiveDate, f64>> {
    let mut map = HashMap::with_capacity(series.len());
    for &(date, value) in series {
        if map.insert(date, value).is_some() {
            return Err(PipelineError::validation(format!(
                "{name} series has duplicate date {date}"
            )));
        }
    }
    Ok(map)
}

fn ensure_positive(value: f64, field: &str, date: NaiveDate) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::domain(format!(
            "{field} on {date} is {value}; log transform needs strictly positive values"
        )))
    }
}
