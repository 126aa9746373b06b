//! Forecasting service: feature scaling plus a pluggable model.
//!
//! The trained sequence model lives outside this workspace. Anything that can
//! map a scaled feature row to a scaled log-return implements
//! [`ForecastModel`]; [`PersistenceModel`] is the no-change baseline.
//!
//! A [`Forecaster`] is built once, explicitly, from a model and the two
//! scalers fitted on the training split, and is immutable afterwards.

use serde::{Deserialize, Serialize};
use trendcast_core::DatasetSplit;

use crate::pipeline::RunError;

/// Column-wise standardisation: `(x - mean) / std`, population std.
/// Zero-variance columns use a scale of 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, RunError> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        if rows.is_empty() || width == 0 {
            return Err(RunError::Model("cannot fit a scaler on no data".into()));
        }
        if let Some(i) = rows.iter().position(|r| r.as_ref().len() != width) {
            return Err(RunError::Dimension {
                expected: width,
                found: rows[i].as_ref().len(),
            });
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.as_ref()) {
                *m += v / n;
            }
        }
        let mut var = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row.as_ref()).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let sd = v.sqrt();
                if sd > 0.0 && sd.is_finite() {
                    sd
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    /// Fit a single-column scaler on a target vector.
    pub fn fit_column(values: &[f64]) -> Result<Self, RunError> {
        let rows: Vec<[f64; 1]> = values.iter().map(|&v| [v]).collect();
        Self::fit(&rows)
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, RunError> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>, RunError> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| v * s + m)
            .collect())
    }

    fn check_width(&self, row: &[f64]) -> Result<(), RunError> {
        if row.len() != self.width() {
            return Err(RunError::Dimension {
                expected: self.width(),
                found: row.len(),
            });
        }
        Ok(())
    }
}

/// Maps a scaled feature row to a scaled next-day log-return.
pub trait ForecastModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &[f64]) -> Result<f64, RunError>;
}

/// Predicts no change: a log-return of zero, expressed in the target scaler's units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistenceModel {
    scaled_zero: f64,
}

impl PersistenceModel {
    pub fn new(y_scaler: &StandardScaler) -> Result<Self, RunError> {
        let scaled = y_scaler.transform(&[0.0])?;
        Ok(Self {
            scaled_zero: scaled[0],
        })
    }
}

impl ForecastModel for PersistenceModel {
    fn name(&self) -> &str {
        "persistence"
    }

    fn predict(&self, _features: &[f64]) -> Result<f64, RunError> {
        Ok(self.scaled_zero)
    }
}

pub struct Forecaster {
    model: Box<dyn ForecastModel>,
    x_scaler: StandardScaler,
    y_scaler: StandardScaler,
}

impl std::fmt::Debug for Forecaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forecaster")
            .field("model", &self.model.name())
            .field("n_features", &self.x_scaler.width())
            .finish()
    }
}

impl Forecaster {
    pub fn new(
        model: Box<dyn ForecastModel>,
        x_scaler: StandardScaler,
        y_scaler: StandardScaler,
    ) -> Result<Self, RunError> {
        if y_scaler.width() != 1 {
            return Err(RunError::Dimension {
                expected: 1,
                found: y_scaler.width(),
            });
        }
        Ok(Self {
            model,
            x_scaler,
            y_scaler,
        })
    }

    /// The no-change baseline over `split`: each scaler is fitted once and
    /// the persistence model reuses the target scaler.
    pub fn persistence_baseline(split: &DatasetSplit) -> Result<Self, RunError> {
        let x_scaler = StandardScaler::fit(&split.x_train)?;
        let y_scaler = StandardScaler::fit_column(&split.y_train)?;
        let model = PersistenceModel::new(&y_scaler)?;
        Self::new(Box::new(model), x_scaler, y_scaler)
    }

    pub fn n_features(&self) -> usize {
        self.x_scaler.width()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn y_scaler(&self) -> &StandardScaler {
        &self.y_scaler
    }

    /// Predicted next-day log-return for one unscaled feature row.
    pub fn predict_log_return(&self, row: &[f64]) -> Result<f64, RunError> {
        let scaled = self.x_scaler.transform(row)?;
        let out = self.model.predict(&scaled)?;
        if !out.is_finite() {
            return Err(RunError::Model(format!(
                "model '{}' returned {out}",
                self.model.name()
            )));
        }
        Ok(self.y_scaler.inverse_transform(&[out])?[0])
    }

    /// `last_close * exp(log_return)`.
    pub fn predict_close(&self, last_close: f64, row: &[f64]) -> Result<f64, RunError> {
        if !(last_close.is_finite() && last_close > 0.0) {
            return Err(RunError::Model(format!(
                "last close must be positive, got {last_close}"
            )));
        }
        Ok(last_close * self.predict_log_return(row)?.exp())
    }
}
