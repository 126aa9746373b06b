//! Supervised windowing: a multivariate series becomes fixed-width
//! (lags, target) rows.
//!
//! For `n_vars` input columns, row `t` holds the lag block
//! `var1(t-n_in) .. varN(t-n_in), ..., var1(t-1) .. varN(t-1)` followed by the
//! horizon block `var1(t) .. varN(t), ..., var1(t+n_out-1) .. varN(t+n_out-1)`.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// A windowed row and the index of the input step it is centred on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedRow {
    /// Index `t` into the input series.
    pub t: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisedTable {
    pub columns: Vec<String>,
    pub rows: Vec<WindowedRow>,
}

impl SupervisedTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.values.clone()).collect()
    }
}

/// `var{j}(t-{k})`, 1-based variable index.
pub fn lag_label(var: usize, k: usize) -> String {
    format!("var{var}(t-{k})")
}

/// `var{j}(t)` for `k == 0`, `var{j}(t+{k})` otherwise.
pub fn lead_label(var: usize, k: usize) -> String {
    if k == 0 {
        format!("var{var}(t)")
    } else {
        format!("var{var}(t+{k})")
    }
}

/// Build the supervised table for `data` (rows are time steps, all of equal width).
///
/// With `drop_incomplete`, rows whose window runs past either end of the
/// series (or touches a NaN) are dropped. The one exception is the
/// single-prediction case: when no row is complete but exactly one row has a
/// full lag block, that row is kept with its unknown horizon values as NaN.
///
/// When `n_out == 1` and the table does not have exactly one row, the second
/// variable's same-step column `var2(t)` is removed. The auxiliary series'
/// value on the target day is not known when predicting that day, so it must
/// not be a training feature. A single-row table is the inference case and
/// keeps it. This rule is fixed for the price/trend layout, not a general
/// windowing behaviour.
pub fn to_supervised(
    data: &[Vec<f64>],
    n_in: usize,
    n_out: usize,
    drop_incomplete: bool,
) -> Result<SupervisedTable> {
    if n_out == 0 {
        return Err(PipelineError::validation("n_out must be at least 1"));
    }
    let n_vars = data.first().map_or(0, Vec::len);
    if n_vars == 0 {
        return Err(PipelineError::validation(
            "series must have at least one row and one column",
        ));
    }
    if let Some(t) = data.iter().position(|row| row.len() != n_vars) {
        return Err(PipelineError::validation(format!(
            "row {t} has {} columns, expected {n_vars}",
            data[t].len()
        )));
    }

    let n = data.len();
    let mut columns = Vec::with_capacity((n_in + n_out) * n_vars);
    for k in (1..=n_in).rev() {
        columns.extend((1..=n_vars).map(|j| lag_label(j, k)));
    }
    for k in 0..n_out {
        columns.extend((1..=n_vars).map(|j| lead_label(j, k)));
    }

    let lag_width = n_in * n_vars;
    let window = |t: usize| -> WindowedRow {
        let mut values = Vec::with_capacity(columns.len());
        for k in (1..=n_in).rev() {
            match t.checked_sub(k) {
                Some(src) => values.extend_from_slice(&data[src]),
                None => values.extend(std::iter::repeat(f64::NAN).take(n_vars)),
            }
        }
        for k in 0..n_out {
            match data.get(t + k) {
                Some(src) => values.extend_from_slice(src),
                None => values.extend(std::iter::repeat(f64::NAN).take(n_vars)),
            }
        }
        WindowedRow { t, values }
    };
    let all: Vec<WindowedRow> = (0..n).map(window).collect();

    let mut rows = if drop_incomplete {
        let complete: Vec<WindowedRow> = all
            .iter()
            .filter(|r| !has_nan(&r.values))
            .cloned()
            .collect();
        if complete.is_empty() {
            // lags and the current step known, horizon beyond the series end
            let known = lag_width + n_vars;
            let mut inference: Vec<WindowedRow> = all
                .into_iter()
                .filter(|r| !has_nan(&r.values[..known]))
                .collect();
            if inference.len() != 1 {
                inference.clear();
            }
            inference
        } else {
            complete
        }
    } else {
        all
    };

    let drop_same_step_aux = n_out == 1 && rows.len() != 1 && n_vars >= 2;
    if drop_same_step_aux {
        let idx = lag_width + 1;
        columns.remove(idx);
        for row in &mut rows {
            row.values.remove(idx);
        }
    }

    Ok(SupervisedTable { columns, rows })
}

fn has_nan(values: &[f64]) -> bool {
    values.iter().any(|v| v.is_nan())
}
