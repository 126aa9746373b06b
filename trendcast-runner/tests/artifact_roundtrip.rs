use chrono::NaiveDate;
use trendcast_core::data::{PriceSource, SyntheticPriceSource, SyntheticTrendSource, TrendRow};
use trendcast_core::{StitchOptions, TrendFrame, TrendStitcher};
use trendcast_runner::artifact::{
    read_meta, read_prices, read_processed, read_trend, read_windowed, write_prices,
    write_processed, write_trend, write_windowed,
};
use trendcast_runner::{build_training_set, ArtifactKind, SCHEMA_VERSION};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn no_pause() -> StitchOptions {
    StitchOptions {
        pause: std::time::Duration::ZERO,
        ..StitchOptions::default()
    }
}

#[test]
fn raw_prices_round_trip_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw/btc.csv");
    let bars = SyntheticPriceSource::new("BTC-USD")
        .fetch(d(2021, 1, 1), d(2021, 3, 31))
        .unwrap();

    let meta = write_prices(&path, &bars).unwrap();
    assert_eq!(meta.kind, ArtifactKind::RawPrices);
    assert_eq!(meta.schema_version, SCHEMA_VERSION);
    assert_eq!(meta.rows, 90);
    assert_eq!(read_prices(&path).unwrap(), bars);
}

#[test]
fn stitched_trend_round_trips_with_partial_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trend.csv");
    let source = SyntheticTrendSource::new().partial_from(d(2021, 12, 30));
    let options = StitchOptions {
        keep_partial: true,
        ..no_pause()
    };
    let frame = TrendStitcher::new(&source, options)
        .stitch(&["bitcoin".to_string(), "crypto".to_string()], d(2021, 1, 1), d(2021, 12, 31))
        .unwrap();
    assert!(frame.partial_column);

    write_trend(&path, &frame).unwrap();
    let back = read_trend(&path).unwrap();
    assert_eq!(back, frame);
    assert!(back.rows[0].is_partial);
    assert!(!back.rows[2].is_partial);
}

#[test]
fn trend_without_partial_flags_omits_the_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trend.csv");
    let frame = TrendFrame {
        keywords: vec!["bitcoin".into()],
        rows: vec![TrendRow {
            date: d(2021, 1, 1),
            values: vec![12.5],
            is_partial: false,
        }],
        partial_column: false,
    };
    let meta = write_trend(&path, &frame).unwrap();
    assert_eq!(meta.columns, vec!["date", "bitcoin"]);
    assert_eq!(read_trend(&path).unwrap(), frame);
}

#[test]
fn processed_and_windowed_artifacts_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let raw_prices = SyntheticPriceSource::new("BTC-USD")
        .fetch(d(2020, 1, 1), d(2020, 6, 30))
        .unwrap();
    let frame = TrendStitcher::new(&SyntheticTrendSource::new(), no_pause())
        .stitch(&["bitcoin".to_string()], d(2020, 1, 1), d(2020, 6, 30))
        .unwrap();
    let aligned = trendcast_core::align(&raw_prices, &frame, "bitcoin").unwrap();

    let processed = dir.path().join("processed/features.csv");
    write_processed(&processed, &aligned).unwrap();
    let aligned_back = read_processed(&processed).unwrap();
    assert_eq!(aligned_back, aligned);

    let training = build_training_set(&aligned_back, 10, 1, 0.7).unwrap();
    let windowed = dir.path().join("processed/windowed.csv");
    let meta = write_windowed(&windowed, &training.table, &training.dates).unwrap();
    assert_eq!(meta.rows, training.table.n_rows());
    assert_eq!(meta.first_date, Some(aligned.rows[10].date));
    assert_eq!(meta.last_date, Some(d(2020, 6, 30)));

    let (dates, table) = read_windowed(&windowed).unwrap();
    assert_eq!(dates, training.row_dates());
    assert_eq!(table.columns, training.table.columns);
    assert_eq!(table.to_matrix(), training.table.to_matrix());
    assert_eq!(read_meta(&windowed).unwrap(), Some(meta));
}
