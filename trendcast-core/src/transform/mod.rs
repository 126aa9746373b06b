//! Alignment, windowing and splitting transforms.

pub mod align;
pub mod split;
pub mod window;

pub use align::{align, align_levels, AlignedRow, AlignedSeries, LOG_RETURNS, LOG_TREND_CHG};
pub use split::{split, split_rows, train_size, DatasetSplit};
pub use window::{lag_label, lead_label, to_supervised, SupervisedTable, WindowedRow};
