//! CSV artifacts with JSON metadata sidecars.
//!
//! Four artifact kinds are written between pipeline stages:
//! - raw prices: `date,open,high,low,close,volume`
//! - raw trend: `date,<keyword>...[,is_partial]`
//! - processed: `date,log_returns,log_trend_chg`
//! - windowed: `date,var1(t-k)...`
//!
//! Floats use Rust's shortest round-trip formatting, so reading an artifact
//! back gives bit-identical values. Every CSV gets a `<stem>.meta.json`
//! sidecar carrying the schema version, row count, date range and a `blake3`
//! hash of the CSV bytes. Readers reject unknown schema versions, mismatched
//! headers and hash mismatches; a missing sidecar is tolerated so that
//! hand-made files can still be loaded.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trendcast_core::data::{read_price_csv, read_trend_csv, PriceBar, SourceError};
use trendcast_core::dates::{format_date, parse_date};
use trendcast_core::transform::{LOG_RETURNS, LOG_TREND_CHG};
use trendcast_core::{AlignedRow, AlignedSeries, SupervisedTable, TrendFrame, WindowedRow};

/// Current artifact schema version. Bump on any layout change.
pub const SCHEMA_VERSION: u32 = 1;

pub const PRICE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
pub const PARTIAL_COLUMN: &str = "is_partial";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("unsupported schema version {found} (max supported: {max})", max = SCHEMA_VERSION)]
    SchemaVersion { found: u32 },

    #[error("{path}: expected {expected:?} artifact, sidecar says {found:?}")]
    KindMismatch {
        path: PathBuf,
        expected: ArtifactKind,
        found: ArtifactKind,
    },

    #[error("{path}: header {found:?} does not match {expected:?}")]
    Header {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path}: content hash does not match its metadata")]
    HashMismatch { path: PathBuf },

    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawPrices,
    RawTrend,
    Processed,
    Windowed,
}

/// Contents of a `.meta.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub schema_version: u32,
    pub kind: ArtifactKind,
    pub rows: usize,
    pub columns: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub blake3: String,
}

/// `data/raw/prices.csv` -> `data/raw/prices.meta.json`.
pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

fn fmt_f64(v: f64) -> String {
    v.to_string()
}

fn parse_f64(path: &Path, row: usize, field: &str) -> Result<f64, ArtifactError> {
    field.trim().parse::<f64>().map_err(|e| ArtifactError::Malformed {
        path: path.to_path_buf(),
        message: format!("row {row}: bad number '{field}': {e}"),
    })
}

fn parse_row_date(path: &Path, row: usize, field: &str) -> Result<NaiveDate, ArtifactError> {
    parse_date(field.trim()).map_err(|e| ArtifactError::Malformed {
        path: path.to_path_buf(),
        message: format!("row {row}: {e}"),
    })
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize `records` (header first) and write the CSV plus its sidecar.
fn write_artifact(
    path: &Path,
    kind: ArtifactKind,
    columns: Vec<String>,
    records: Vec<Vec<String>>,
    dates: &[NaiveDate],
) -> Result<ArtifactMeta, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&columns)?;
    for record in &records {
        wtr.write_record(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })?;

    let meta = ArtifactMeta {
        schema_version: SCHEMA_VERSION,
        kind,
        rows: records.len(),
        columns,
        first_date: dates.iter().min().copied(),
        last_date: dates.iter().max().copied(),
        blake3: blake3::hash(&bytes).to_hex().to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(path, &bytes).map_err(io_err(path))?;
    let meta_file = meta_path(path);
    fs::write(&meta_file, serde_json::to_string_pretty(&meta)?).map_err(io_err(&meta_file))?;
    log::info!("wrote {} rows to {}", meta.rows, path.display());
    Ok(meta)
}

/// Read an artifact's bytes, checking the sidecar when one exists.
fn read_artifact(path: &Path, kind: ArtifactKind) -> Result<Vec<u8>, ArtifactError> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    if let Some(meta) = read_meta(path)? {
        if meta.schema_version > SCHEMA_VERSION {
            return Err(ArtifactError::SchemaVersion {
                found: meta.schema_version,
            });
        }
        if meta.kind != kind {
            return Err(ArtifactError::KindMismatch {
                path: path.to_path_buf(),
                expected: kind,
                found: meta.kind,
            });
        }
        if blake3::hash(&bytes).to_hex().as_str() != meta.blake3 {
            return Err(ArtifactError::HashMismatch {
                path: path.to_path_buf(),
            });
        }
    } else {
        log::debug!("{} has no metadata sidecar", path.display());
    }
    Ok(bytes)
}

/// Load the sidecar for `path`, if present.
pub fn read_meta(path: &Path) -> Result<Option<ArtifactMeta>, ArtifactError> {
    let meta_file = meta_path(path);
    if !meta_file.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&meta_file).map_err(io_err(&meta_file))?;
    Ok(Some(serde_json::from_str(&text)?))
}

fn header_of(bytes: &[u8]) -> Result<Vec<String>, ArtifactError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    Ok(rdr.headers()?.iter().map(str::to_string).collect())
}

fn expect_header(path: &Path, found: Vec<String>, expected: &[&str]) -> Result<(), ArtifactError> {
    if found.iter().map(String::as_str).ne(expected.iter().copied()) {
        return Err(ArtifactError::Header {
            path: path.to_path_buf(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found,
        });
    }
    Ok(())
}

// ─── Raw prices ─────────────────────────────────────────────────────

pub fn write_prices(path: &Path, bars: &[PriceBar]) -> Result<ArtifactMeta, ArtifactError> {
    let records = bars
        .iter()
        .map(|b| {
            vec![
                format_date(b.date),
                fmt_f64(b.open),
                fmt_f64(b.high),
                fmt_f64(b.low),
                fmt_f64(b.close),
                fmt_f64(b.volume),
            ]
        })
        .collect();
    let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
    let columns = PRICE_COLUMNS.iter().map(|s| s.to_string()).collect();
    write_artifact(path, ArtifactKind::RawPrices, columns, records, &dates)
}

pub fn read_prices(path: &Path) -> Result<Vec<PriceBar>, ArtifactError> {
    let bytes = read_artifact(path, ArtifactKind::RawPrices)?;
    expect_header(path, header_of(&bytes)?, &PRICE_COLUMNS)?;
    Ok(read_price_csv(bytes.as_slice())?)
}

// ─── Raw trend ──────────────────────────────────────────────────────

/// Write a stitched frame in frame order. The `is_partial` column is only
/// written when the frame carries partial flags.
pub fn write_trend(path: &Path, frame: &TrendFrame) -> Result<ArtifactMeta, ArtifactError> {
    let mut columns = vec!["date".to_string()];
    columns.extend(frame.keywords.iter().cloned());
    if frame.partial_column {
        columns.push(PARTIAL_COLUMN.to_string());
    }

    let records = frame
        .rows
        .iter()
        .map(|row| {
            let mut record = Vec::with_capacity(columns.len());
            record.push(format_date(row.date));
            record.extend(row.values.iter().map(|&v| fmt_f64(v)));
            if frame.partial_column {
                record.push(row.is_partial.to_string());
            }
            record
        })
        .collect();
    let dates: Vec<NaiveDate> = frame.dates().collect();
    write_artifact(path, ArtifactKind::RawTrend, columns, records, &dates)
}

pub fn read_trend(path: &Path) -> Result<TrendFrame, ArtifactError> {
    let bytes = read_artifact(path, ArtifactKind::RawTrend)?;
    let header = header_of(&bytes)?;
    if header.first().map(String::as_str) != Some("date") || header.len() < 2 {
        return Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            message: format!("trend header must be date followed by keywords, got {header:?}"),
        });
    }
    let partial_column = header.iter().any(|h| h == PARTIAL_COLUMN);
    let table = read_trend_csv(bytes.as_slice())?;
    if table.keywords.is_empty() {
        return Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            message: "trend file has no keyword columns".into(),
        });
    }
    Ok(TrendFrame {
        keywords: table.keywords,
        rows: table.rows,
        partial_column,
    })
}

// ─── Processed (aligned) ────────────────────────────────────────────

pub fn write_processed(path: &Path, series: &AlignedSeries) -> Result<ArtifactMeta, ArtifactError> {
    let columns = vec!["date".to_string(), LOG_RETURNS.to_string(), LOG_TREND_CHG.to_string()];
    let records = series
        .rows
        .iter()
        .map(|r| vec![format_date(r.date), fmt_f64(r.log_return), fmt_f64(r.log_trend_chg)])
        .collect();
    write_artifact(path, ArtifactKind::Processed, columns, records, &series.dates())
}

pub fn read_processed(path: &Path) -> Result<AlignedSeries, ArtifactError> {
    let bytes = read_artifact(path, ArtifactKind::Processed)?;
    expect_header(path, header_of(&bytes)?, &["date", LOG_RETURNS, LOG_TREND_CHG])?;

    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |j: usize| record.get(j).unwrap_or("");
        rows.push(AlignedRow {
            date: parse_row_date(path, i + 1, field(0))?,
            log_return: parse_f64(path, i + 1, field(1))?,
            log_trend_chg: parse_f64(path, i + 1, field(2))?,
        });
    }
    if rows.windows(2).any(|w| w[0].date >= w[1].date) {
        return Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            message: "processed rows must be strictly ascending by date".into(),
        });
    }
    Ok(AlignedSeries { rows })
}

// ─── Windowed ───────────────────────────────────────────────────────

/// Write a windowed table. `dates[t]` labels the row centred on input step
/// `t`, so `dates` is the date index of the series that was windowed.
pub fn write_windowed(
    path: &Path,
    table: &SupervisedTable,
    dates: &[NaiveDate],
) -> Result<ArtifactMeta, ArtifactError> {
    let mut columns = vec!["date".to_string()];
    columns.extend(table.columns.iter().cloned());

    let mut records = Vec::with_capacity(table.n_rows());
    let mut row_dates = Vec::with_capacity(table.n_rows());
    for row in &table.rows {
        let date = dates.get(row.t).copied().ok_or_else(|| ArtifactError::Malformed {
            path: path.to_path_buf(),
            message: format!("row index {} has no date ({} dates given)", row.t, dates.len()),
        })?;
        let mut record = Vec::with_capacity(columns.len());
        record.push(format_date(date));
        record.extend(row.values.iter().map(|&v| fmt_f64(v)));
        records.push(record);
        row_dates.push(date);
    }
    write_artifact(path, ArtifactKind::Windowed, columns, records, &row_dates)
}

/// Read a windowed table back. Row `i` gets `t = i`; the dates come back
/// alongside.
pub fn read_windowed(path: &Path) -> Result<(Vec<NaiveDate>, SupervisedTable), ArtifactError> {
    let bytes = read_artifact(path, ArtifactKind::Windowed)?;
    let header = header_of(&bytes)?;
    if header.first().map(String::as_str) != Some("date") {
        return Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            message: "windowed file must start with a date column".into(),
        });
    }
    if let Some(meta) = read_meta(path)? {
        let expected: Vec<&str> = meta.columns.iter().map(String::as_str).collect();
        expect_header(path, header.clone(), &expected)?;
    }
    let columns: Vec<String> = header[1..].to_vec();

    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        dates.push(parse_row_date(path, i + 1, record.get(0).unwrap_or(""))?);
        let values = record
            .iter()
            .skip(1)
            .map(|f| parse_f64(path, i + 1, f))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(WindowedRow { t: i, values });
    }
    Ok((dates, SupervisedTable { columns, rows }))
}
