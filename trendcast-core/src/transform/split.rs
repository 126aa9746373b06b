//! Chronological train/test split.
//!
//! Rows keep their order; nothing is shuffled. The last column is the target,
//! everything before it is a feature.

use super::window::SupervisedTable;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
    pub n_features: usize,
}

impl DatasetSplit {
    pub fn n_train(&self) -> usize {
        self.x_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.x_test.len()
    }
}

/// `floor(n * ratio)`.
pub fn train_size(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).floor() as usize).min(n)
}

/// Split a windowed table; see [`split_rows`].
pub fn split(table: &SupervisedTable, ratio: f64) -> Result<DatasetSplit> {
    let rows: Vec<&[f64]> = table.rows.iter().map(|r| r.values.as_slice()).collect();
    split_rows(&rows, table.n_cols(), ratio)
}

/// The first `floor(n * ratio)` rows train, the rest test.
pub fn split_rows<R: AsRef<[f64]>>(rows: &[R], n_cols: usize, ratio: f64) -> Result<DatasetSplit> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(PipelineError::validation(format!(
            "split ratio must be within [0, 1], got {ratio}"
        )));
    }
    if n_cols == 0 {
        return Err(PipelineError::validation("table has no target column"));
    }
    if let Some(i) = rows.iter().position(|r| r.as_ref().len() != n_cols) {
        return Err(PipelineError::validation(format!(
            "row {i} has {} columns, expected {n_cols}",
            rows[i].as_ref().len()
        )));
    }

    let n_features = n_cols - 1;
    let cut = train_size(rows.len(), ratio);
    let unzip = |part: &[R]| -> (Vec<Vec<f64>>, Vec<f64>) {
        part.iter()
            .map(|r| {
                let (x, y) = r.as_ref().split_at(n_features);
                (x.to_vec(), y[0])
            })
            .unzip()
    };
    let (x_train, y_train) = unzip(&rows[..cut]);
    let (x_test, y_test) = unzip(&rows[cut..]);

    Ok(DatasetSplit {
        x_train,
        y_train,
        x_test,
        y_test,
        n_features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::window::to_supervised;

    fn numbered(n: usize, cols: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| (0..cols).map(|j| (i * 10 + j) as f64).collect())
            .collect()
    }

    #[test]
    fn seventy_thirty_on_ninety_rows() {
        let rows = numbered(90, 21);
        let split = split_rows(&rows, 21, 0.7).unwrap();
        assert_eq!(split.n_train(), 63);
        assert_eq!(split.n_test(), 27);
        assert_eq!(split.n_features, 20);
        assert!(split.x_train.iter().chain(&split.x_test).all(|x| x.len() == 20));
    }

    #[test]
    fn order_is_preserved() {
        let rows = numbered(10, 3);
        let split = split_rows(&rows, 3, 0.5).unwrap();
        assert_eq!(split.y_train, vec![2.0, 12.0, 22.0, 32.0, 42.0]);
        assert_eq!(split.x_test[0], vec![50.0, 51.0]);
        assert_eq!(split.y_test.last(), Some(&92.0));
    }

    #[test]
    fn boundary_is_floor() {
        assert_eq!(train_size(10, 0.75), 7);
        assert_eq!(train_size(3, 0.7), 2);
        assert_eq!(train_size(0, 0.7), 0);
        assert_eq!(train_size(5, 1.0), 5);
    }

    #[test]
    fn splits_a_windowed_table() {
        let data: Vec<Vec<f64>> = (0..100).map(|t| vec![t as f64, -(t as f64)]).collect();
        let table = to_supervised(&data, 10, 1, true).unwrap();
        let split = split(&table, 0.7).unwrap();
        assert_eq!(split.n_train() + split.n_test(), 90);
        assert_eq!(split.n_features, table.n_cols() - 1);
        // target is var1(t) of the first training row, t = 10
        assert_eq!(split.y_train[0], 10.0);
    }

    #[test]
    fn rejects_bad_ratio_and_shape() {
        let rows = numbered(4, 2);
        assert!(split_rows(&rows, 2, 1.5).is_err());
        assert!(split_rows(&rows, 2, f64::NAN).is_err());
        assert!(split_rows(&rows, 3, 0.5).is_err());
        assert!(split_rows(&rows, 0, 0.5).is_err());
    }
}
