//! Trendcast Core: the time-series preparation pipeline behind the price forecaster.
//!
//! This crate turns two irregularly overlapping daily series, closing prices and
//! search interest, into a fixed-width feature matrix for a sequence model:
//! - Date parsing and validation
//! - Trend-window stitching over a source that only answers bounded,
//!   independently normalised queries
//! - Inner-join alignment with log-difference features
//! - Supervised windowing into lag/target rows
//! - Chronological train/test split
//! - Data sources (traits, HTTP price client, CSV replay, synthetic)

pub mod data;
pub mod dates;
pub mod error;
pub mod stitch;
pub mod transform;

pub use error::{PipelineError, Result};
pub use stitch::{plan_windows, StitchOptions, TrendFrame, TrendStitcher};
pub use transform::{
    align, align_levels, split, to_supervised, AlignedRow, AlignedSeries, DatasetSplit,
    SupervisedTable, WindowedRow,
};
