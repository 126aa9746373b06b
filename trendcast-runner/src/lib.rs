//! Trendcast Runner: pipeline orchestration, configuration, artifacts, forecasting.
//!
//! This crate builds on `trendcast-core` to provide:
//! - TOML pipeline configuration
//! - Stage functions: fetch, align, window + split, inference row
//! - CSV artifacts with hashed metadata sidecars
//! - The forecasting service (scalers + model trait)

pub mod artifact;
pub mod config;
pub mod forecast;
pub mod pipeline;

pub use artifact::{ArtifactError, ArtifactKind, ArtifactMeta, SCHEMA_VERSION};
pub use config::{ConfigError, PipelineConfig};
pub use forecast::{ForecastModel, Forecaster, PersistenceModel, StandardScaler};
pub use pipeline::{
    build_features, build_inference_row, build_training_set, fetch_raw, fetch_recent,
    InferenceRow, RawData, RunError, TrainingSet,
};
