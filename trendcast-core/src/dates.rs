//! Calendar-date parsing and validation.
//!
//! All dates cross the pipeline boundary as `YYYY-MM-DD` strings.

use crate::error::{PipelineError, Result};
use chrono::{Duration, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    // chrono accepts unpadded fields, the wire format does not
    if s.len() != 10 {
        return Err(bad_format(s));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| bad_format(s))
}

/// Validate a date string without keeping the parsed value.
pub fn check_date(s: &str) -> Result<()> {
    parse_date(s).map(|_| ())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Signed number of days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Date range fetched for a single prediction: `look_back + 3` days ending today.
///
/// The three spare days absorb the trend source lagging the price source and
/// the first aligned row that the log-difference drops.
pub fn recent_range(today: NaiveDate, look_back: usize) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(look_back as i64 + 3), today)
}

fn bad_format(s: &str) -> PipelineError {
    PipelineError::validation(format!(
        "incorrect date format '{s}', should be YYYY-MM-DD"
    ))
}
