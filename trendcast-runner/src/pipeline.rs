//! Pipeline orchestration: fetch, align, window, split.
//!
//! Each stage is a plain function over owned data so the CLI can persist an
//! artifact between any two of them. Nothing here retries or falls back; a
//! failing source fails the whole stage and no partial result is returned.

use chrono::NaiveDate;
use thiserror::Error;

use trendcast_core::data::{PriceBar, PriceSource, TrendSource};
use trendcast_core::dates::recent_range;
use trendcast_core::{
    align, split, to_supervised, AlignedSeries, DatasetSplit, PipelineError, SupervisedTable,
    TrendFrame, TrendStitcher,
};

use crate::artifact::ArtifactError;
use crate::config::{ConfigError, PipelineConfig};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("expected {expected} values, got {found}")]
    Dimension { expected: usize, found: usize },
    #[error("model error: {0}")]
    Model(String),
}

/// Everything fetched for one date range.
#[derive(Debug, Clone, PartialEq)]
pub struct RawData {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub prices: Vec<PriceBar>,
    pub trend: TrendFrame,
}

impl RawData {
    /// Close of the most recent price bar.
    pub fn last_close(&self) -> Option<(NaiveDate, f64)> {
        self.prices
            .iter()
            .max_by_key(|b| b.date)
            .map(|b| (b.date, b.close))
    }
}

/// Fetch prices and the stitched trend over the configured range. `to_date`
/// falls back to `today`.
pub fn fetch_raw(
    config: &PipelineConfig,
    prices: &dyn PriceSource,
    trend: &dyn TrendSource,
    today: NaiveDate,
) -> Result<RawData, RunError> {
    let from = config.from_date()?;
    let to = config.to_date_or(today)?;
    fetch_range(config, prices, trend, from, to)
}

/// Fetch just enough recent history to build one inference row ending at `today`.
pub fn fetch_recent(
    config: &PipelineConfig,
    prices: &dyn PriceSource,
    trend: &dyn TrendSource,
    today: NaiveDate,
) -> Result<RawData, RunError> {
    let (from, to) = recent_range(today, config.features.look_back);
    fetch_range(config, prices, trend, from, to)
}

fn fetch_range(
    config: &PipelineConfig,
    prices: &dyn PriceSource,
    trend: &dyn TrendSource,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<RawData, RunError> {
    if from > to {
        return Err(PipelineError::validation(format!("from {from} is after to {to}")).into());
    }

    log::info!("fetching {} prices {from}..{to} from {}", config.data.symbol, prices.name());
    let bars = prices.fetch(from, to).map_err(PipelineError::from)?;
    if bars.is_empty() {
        return Err(PipelineError::no_data(format!(
            "{} returned no prices for {from}..{to}",
            prices.name()
        ))
        .into());
    }

    let stitcher = TrendStitcher::new(trend, config.stitch_options());
    let frame = stitcher.stitch(&config.data.keywords, from, to)?;
    log::info!("fetched {} price bars and {} trend rows", bars.len(), frame.len());

    Ok(RawData {
        from,
        to,
        prices: bars,
        trend: frame,
    })
}

/// Align raw prices with one trend keyword.
pub fn build_features(raw: &RawData, keyword: &str) -> Result<AlignedSeries, RunError> {
    let aligned = align(&raw.prices, &raw.trend, keyword)?;
    log::info!(
        "aligned {} rows ({} price bars, {} trend rows)",
        aligned.len(),
        raw.prices.len(),
        raw.trend.len()
    );
    Ok(aligned)
}

/// Windowed table plus its chronological split.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// Date index of the windowed series; row `t` of `table` is `dates[t]`.
    pub dates: Vec<NaiveDate>,
    pub table: SupervisedTable,
    pub split: DatasetSplit,
}

impl TrainingSet {
    /// Dates of the windowed rows, in table order.
    pub fn row_dates(&self) -> Vec<NaiveDate> {
        self.table.rows.iter().map(|r| self.dates[r.t]).collect()
    }
}

/// Window the aligned series with `look_back` lags and split it.
///
/// At least two windowed rows are required: a single row would keep the
/// inference layout and no longer match the training feature width.
pub fn build_training_set(
    aligned: &AlignedSeries,
    look_back: usize,
    n_out: usize,
    ratio: f64,
) -> Result<TrainingSet, RunError> {
    if look_back == 0 {
        return Err(PipelineError::validation("look_back must be at least 1").into());
    }
    let needed = look_back + n_out + 1;
    if aligned.len() < needed {
        return Err(PipelineError::no_data(format!(
            "need at least {needed} aligned rows for look_back {look_back}, got {}",
            aligned.len()
        ))
        .into());
    }

    let table = to_supervised(&aligned.to_matrix(), look_back, n_out, true)?;
    if table.n_rows() < 2 {
        return Err(PipelineError::no_data(format!(
            "only {} complete windowed rows",
            table.n_rows()
        ))
        .into());
    }
    let split = split(&table, ratio)?;
    log::info!(
        "windowed {} rows x {} columns; {} train / {} test",
        table.n_rows(),
        table.n_cols(),
        split.n_train(),
        split.n_test()
    );

    Ok(TrainingSet {
        dates: aligned.dates(),
        table,
        split,
    })
}

/// The single feature row used to predict the day after the last aligned date.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRow {
    /// Last aligned date the row covers.
    pub date: NaiveDate,
    pub columns: Vec<String>,
    pub features: Vec<f64>,
}

/// Window the most recent `look_back` aligned rows with `look_back - 1` lags.
///
/// The result is one row of `2 * look_back` values: the same width as a
/// training feature row, since the lone row keeps `var2(t)`.
pub fn build_inference_row(aligned: &AlignedSeries, look_back: usize) -> Result<InferenceRow, RunError> {
    if look_back < 2 {
        return Err(PipelineError::validation("look_back must be at least 2").into());
    }
    if aligned.len() < look_back {
        return Err(PipelineError::no_data(format!(
            "need {look_back} aligned rows for an inference row, got {}",
            aligned.len()
        ))
        .into());
    }

    let recent = aligned.tail(look_back);
    let table = to_supervised(&recent.to_matrix(), look_back - 1, 1, true)?;
    let row = match table.rows.as_slice() {
        [row] => row.clone(),
        rows => {
            return Err(PipelineError::no_data(format!(
                "expected exactly one inference row, got {}",
                rows.len()
            ))
            .into())
        }
    };
    let expected = 2 * look_back;
    if row.values.len() != expected {
        return Err(RunError::Dimension {
            expected,
            found: row.values.len(),
        });
    }

    Ok(InferenceRow {
        date: recent.rows[row.t].date,
        columns: table.columns,
        features: row.values,
    })
}
