//! CSV replay sources.
//!
//! Raw price files use the header `date,open,high,low,close,volume` (only
//! `date` and `close` are required). Raw trend files use
//! `date,<keyword>...,is_partial`, with `is_partial` optional.

use super::provider::{
    normalize_to_100, PriceBar, PriceSource, SourceError, TrendQueryWindow, TrendRow, TrendSource,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct PriceRecord {
    date: NaiveDate,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Parse a raw price CSV. Rows come back in file order.
pub fn read_price_csv<R: Read>(reader: R) -> Result<Vec<PriceBar>, SourceError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    for record in rdr.deserialize::<PriceRecord>() {
        let r = record?;
        bars.push(PriceBar {
            date: r.date,
            open: r.open.unwrap_or(f64::NAN),
            high: r.high.unwrap_or(f64::NAN),
            low: r.low.unwrap_or(f64::NAN),
            close: r.close,
            volume: r.volume.unwrap_or(0.0),
        });
    }
    Ok(bars)
}

/// A parsed raw trend file: keyword columns plus rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendTable {
    pub keywords: Vec<String>,
    pub rows: Vec<TrendRow>,
}

/// Parse a raw trend CSV. Every column other than `date` and `is_partial`
/// is a keyword column.
pub fn read_trend_csv<R: Read>(reader: R) -> Result<TrendTable, SourceError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let date_idx = headers
        .iter()
        .position(|h| h == "date")
        .ok_or_else(|| SourceError::Parse("trend file has no 'date' column".into()))?;
    let partial_idx = headers.iter().position(|h| h == "is_partial");
    let keyword_idx: Vec<usize> = (0..headers.len())
        .filter(|&i| i != date_idx && Some(i) != partial_idx)
        .collect();
    let keywords = keyword_idx.iter().map(|&i| headers[i].to_string()).collect();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let date = NaiveDate::parse_from_str(field(date_idx), "%Y-%m-%d").map_err(|e| {
            SourceError::Parse(format!("row {}: bad date '{}': {e}", line + 1, field(date_idx)))
        })?;
        let values = keyword_idx
            .iter()
            .map(|&i| {
                field(i).parse::<f64>().map_err(|e| {
                    SourceError::Parse(format!("row {}: bad value '{}': {e}", line + 1, field(i)))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let is_partial = match partial_idx.map(field) {
            None | Some("") => false,
            Some(v) => parse_bool(v).ok_or_else(|| {
                SourceError::Parse(format!("row {}: bad is_partial '{v}'", line + 1))
            })?,
        };

        rows.push(TrendRow {
            date,
            values,
            is_partial,
        });
    }

    Ok(TrendTable { keywords, rows })
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Replays a raw price file as a price source.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    bars: Vec<PriceBar>,
}

impl CsvPriceSource {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars }
    }

    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(read_price_csv(file)?))
    }
}

impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv_replay"
    }

    fn fetch(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PriceBar>, SourceError> {
        Ok(self
            .bars
            .iter()
            .filter(|b| b.date >= from && b.date <= to)
            .cloned()
            .collect())
    }
}

/// Replays a raw trend file as a trend source.
///
/// With `normalize_per_query`, every query is rescaled so its maximum value
/// across the requested keywords is 100, the way the live service answers.
#[derive(Debug, Clone)]
pub struct CsvTrendSource {
    table: TrendTable,
    normalize_per_query: bool,
}

impl CsvTrendSource {
    pub fn new(table: TrendTable) -> Self {
        Self {
            table,
            normalize_per_query: false,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(read_trend_csv(file)?))
    }

    pub fn normalize_per_query(mut self, enabled: bool) -> Self {
        self.normalize_per_query = enabled;
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.table.keywords
    }
}

impl TrendSource for CsvTrendSource {
    fn name(&self) -> &str {
        "csv_replay"
    }

    fn query(&self, window: &TrendQueryWindow) -> Result<Vec<TrendRow>, SourceError> {
        let columns: BTreeMap<&str, usize> = self
            .table
            .keywords
            .iter()
            .enumerate()
            .map(|(i, k)| (k.as_str(), i))
            .collect();
        let selected = window
            .keywords
            .iter()
            .map(|k| {
                columns
                    .get(k.as_str())
                    .copied()
                    .ok_or_else(|| SourceError::Other(format!("keyword '{k}' not in trend file")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows: Vec<TrendRow> = self
            .table
            .rows
            .iter()
            .filter(|r| window.contains(r.date))
            .map(|r| TrendRow {
                date: r.date,
                values: selected.iter().map(|&i| r.values[i]).collect(),
                is_partial: r.is_partial,
            })
            .collect();

        if self.normalize_per_query {
            normalize_to_100(&mut rows);
        }
        Ok(rows)
    }
}
