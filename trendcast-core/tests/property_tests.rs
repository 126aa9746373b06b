//! Property tests for the pipeline stages.
//!
//! 1. Stitching covers every requested date exactly once
//! 2. A range that fits in one window is returned as queried
//! 3. Alignment drops exactly one row from the date intersection
//! 4. Windowing shape follows from series length and look-back
//! 5. Splitting partitions every row, features = columns - 1

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::HashSet;
use trendcast_core::data::{SyntheticTrendSource, TrendQueryWindow, TrendSource};
use trendcast_core::transform::split_rows;
use trendcast_core::{align_levels, to_supervised, StitchOptions, TrendStitcher};

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_window_sizing() -> impl Strategy<Value = (u32, u32)> {
    (2u32..=270).prop_flat_map(|trdays| (Just(trdays), 0..trdays))
}

fn arb_levels(len: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.8, 1.0..1000.0_f64), len)
}

// ── 1-2. Stitching ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stitch_covers_range_without_duplicates(
        offset in 0i64..2000,
        span in 0i64..600,
        (trdays, overlap) in arb_window_sizing(),
        forward in any::<bool>(),
    ) {
        let from = base() + Duration::days(offset);
        let to = from + Duration::days(span);
        let opts = StitchOptions {
            trdays,
            overlap,
            stitch_forward: forward,
            pause: std::time::Duration::ZERO,
            ..StitchOptions::default()
        };
        let frame = TrendStitcher::new(&SyntheticTrendSource::new(), opts)
            .stitch(&["bitcoin".to_string()], from, to)
            .unwrap();

        let dates: HashSet<NaiveDate> = frame.dates().collect();
        prop_assert_eq!(dates.len(), frame.len());
        prop_assert_eq!(frame.len() as i64, span + 1);
        prop_assert!(frame.dates().all(|d| d >= from && d <= to));
        for pair in frame.rows.windows(2) {
            prop_assert!(pair[0].date > pair[1].date);
        }
    }

    #[test]
    fn single_window_is_not_rescaled(
        offset in 0i64..2000,
        span in 0i64..=250,
    ) {
        let from = base() + Duration::days(offset);
        let to = from + Duration::days(span);
        let keywords = vec!["bitcoin".to_string(), "ethereum".to_string()];
        let source = SyntheticTrendSource::new();

        let frame = TrendStitcher::new(&source, StitchOptions {
            pause: std::time::Duration::ZERO,
            ..StitchOptions::default()
        })
        .stitch(&keywords, from, to)
        .unwrap();
        let direct = source.query(&TrendQueryWindow::new(from, to, &keywords)).unwrap();

        prop_assert_eq!(frame.len(), direct.len());
        for (got, want) in frame.rows.iter().rev().zip(&direct) {
            prop_assert_eq!(got.date, want.date);
            for (a, b) in got.values.iter().zip(&want.values) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}

// ── 3-5. Transforms ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn align_row_count_is_intersection_minus_one(
        prices in arb_levels(60),
        trend in arb_levels(60),
    ) {
        let series = |levels: &[Option<f64>]| -> Vec<(NaiveDate, f64)> {
            levels
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (base() + Duration::days(i as i64), v)))
                .collect()
        };
        let p = series(&prices);
        let t = series(&trend);
        let shared = prices
            .iter()
            .zip(&trend)
            .filter(|(a, b)| a.is_some() && b.is_some())
            .count();

        let aligned = align_levels(&p, &t).unwrap();
        prop_assert_eq!(aligned.len(), shared.saturating_sub(1));
        prop_assert!(aligned
            .rows
            .iter()
            .all(|r| r.log_return.is_finite() && r.log_trend_chg.is_finite()));
    }

    #[test]
    fn window_shape_follows_length(n in 1usize..150, n_in in 0usize..20) {
        let data: Vec<Vec<f64>> = (0..n).map(|t| vec![t as f64, (t * 2) as f64]).collect();
        let table = to_supervised(&data, n_in, 1, true).unwrap();

        let rows = n.saturating_sub(n_in);
        prop_assert_eq!(table.n_rows(), rows);
        let expected_cols = if rows == 1 { n_in * 2 + 2 } else { n_in * 2 + 1 };
        prop_assert_eq!(table.n_cols(), expected_cols);
        prop_assert!(table.rows.iter().all(|r| r.values.len() == expected_cols));
    }

    #[test]
    fn split_partitions_rows(n in 0usize..300, cols in 1usize..30, ratio in 0.0..1.0_f64) {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64; cols]).collect();
        let ds = split_rows(&rows, cols, ratio).unwrap();

        prop_assert_eq!(ds.n_train() + ds.n_test(), n);
        prop_assert_eq!(ds.n_train(), (n as f64 * ratio).floor() as usize);
        prop_assert_eq!(ds.n_features, cols - 1);
        prop_assert!(ds.x_train.iter().chain(&ds.x_test).all(|x| x.len() == cols - 1));
        prop_assert_eq!(ds.y_train.len(), ds.n_train());
    }
}
