//! Trend-window stitching.
//!
//! The trend source only answers queries spanning at most [`MAX_WINDOW_DAYS`]
//! days, and it normalises every answer to its own 0-100 scale. To get a long
//! history on one consistent scale, the range is cut into overlapping
//! sub-windows. Each new window is rescaled onto the series stitched so far
//! using the dates both share:
//!
//! ```text
//! norm_factor[kw] = mean over shared dates of (existing[kw] / new[kw])
//! ```
//!
//! Non-finite ratios are ignored. Only dates not already covered are
//! appended, so every window ends up on the scale of the first one queried.

use crate::data::provider::{
    normalize_to_100, SourceError, TrendQueryWindow, TrendRow, TrendSource, MAX_KEYWORDS,
    MAX_WINDOW_DAYS,
};
use crate::error::{PipelineError, Result};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashSet};

/// Knobs for a stitch run.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchOptions {
    /// Days spanned by each sub-window query.
    pub trdays: u32,
    /// Days shared between consecutive sub-windows.
    pub overlap: u32,
    /// Rescale the final output so its maximum across all keywords is 100.
    pub scale: bool,
    /// Query oldest-first instead of most-recent-first.
    pub stitch_forward: bool,
    /// Keep the `is_partial` flag in the output.
    pub keep_partial: bool,
    /// Courtesy pause between consecutive queries.
    pub pause: std::time::Duration,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            trdays: 250,
            overlap: 100,
            scale: true,
            stitch_forward: false,
            keep_partial: false,
            pause: std::time::Duration::from_secs(1),
        }
    }
}

impl StitchOptions {
    pub fn validate(&self) -> Result<()> {
        if i64::from(self.trdays) > MAX_WINDOW_DAYS {
            return Err(PipelineError::validation(format!(
                "trdays must not exceed {MAX_WINDOW_DAYS} (got {})",
                self.trdays
            )));
        }
        if self.overlap >= self.trdays {
            return Err(PipelineError::validation(format!(
                "overlap ({}) must be smaller than trdays ({})",
                self.overlap, self.trdays
            )));
        }
        Ok(())
    }

    /// Days between the ends of consecutive sub-windows.
    pub fn stride(&self) -> u32 {
        self.trdays - self.overlap
    }
}

/// Stitched output: one value column per keyword, sorted by date descending.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFrame {
    pub keywords: Vec<String>,
    pub rows: Vec<TrendRow>,
    /// Whether `is_partial` carries information. When false every flag is
    /// cleared and writers omit the column.
    pub partial_column: bool,
}

impl TrendFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a keyword's value column.
    pub fn column(&self, keyword: &str) -> Option<usize> {
        self.keywords.iter().position(|k| k == keyword)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }

    /// `(date, value)` pairs for one keyword, in frame order.
    pub fn series(&self, keyword: &str) -> Option<Vec<(NaiveDate, f64)>> {
        let col = self.column(keyword)?;
        Some(self.rows.iter().map(|r| (r.date, r.values[col])).collect())
    }
}

/// Split `[from, to]` into sub-windows of `trdays` days advancing by the
/// stride, most recent first (oldest first when `forward`).
///
/// A range that fits in one window yields exactly `(from, to)`. Otherwise the
/// oldest window may start before `from`; the stitcher trims those dates.
pub fn plan_windows(
    from: NaiveDate,
    to: NaiveDate,
    trdays: u32,
    overlap: u32,
    forward: bool,
) -> Vec<(NaiveDate, NaiveDate)> {
    let n_days = (to - from).num_days();
    let trdays = i64::from(trdays);
    let stride = trdays - i64::from(overlap);

    let mut windows = if n_days <= trdays {
        vec![(from, to)]
    } else {
        let mut out = Vec::new();
        let mut i = 0;
        while i < n_days - trdays + stride {
            out.push((to - Duration::days(i + trdays), to - Duration::days(i)));
            i += stride;
        }
        out
    };

    if forward {
        windows.reverse();
    }
    windows
}

/// Rebuilds a long, consistently scaled trend series from bounded queries.
pub struct TrendStitcher<'a> {
    source: &'a dyn TrendSource,
    options: StitchOptions,
}

impl<'a> TrendStitcher<'a> {
    pub fn new(source: &'a dyn TrendSource, options: StitchOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &StitchOptions {
        &self.options
    }

    /// Stitch `keywords` over `[from, to]`.
    ///
    /// Fails with `Validation` before any query when the inputs are bad, with
    /// `NoData` when the first window comes back empty, and with
    /// `ExternalSource` when any query fails. No partial output is returned.
    pub fn stitch(&self, keywords: &[String], from: NaiveDate, to: NaiveDate) -> Result<TrendFrame> {
        validate_keywords(keywords)?;
        self.options.validate()?;
        if to < from {
            return Err(PipelineError::validation(format!(
                "from_date {from} is after to_date {to}"
            )));
        }

        let opts = &self.options;
        let windows = plan_windows(from, to, opts.trdays, opts.overlap, opts.stitch_forward);
        let mut windows = windows.into_iter();
        log::info!(
            "stitching {keywords:?} over {from}..{to} with {} window(s) via {}",
            windows.len(),
            self.source.name()
        );

        let mut stitched: BTreeMap<NaiveDate, TrendRow> = BTreeMap::new();
        if let Some((start, end)) = windows.next() {
            let rows = self.query(keywords, start, end)?;
            if rows.is_empty() {
                return Err(PipelineError::no_data(format!(
                    "search terms {keywords:?} returned no results for {start}..{end}"
                )));
            }
            for row in rows {
                stitched.insert(row.date, row);
            }
        }

        for (start, end) in windows {
            if !opts.pause.is_zero() {
                std::thread::sleep(opts.pause);
            }
            let rows = self.query(keywords, start, end)?;
            if rows.is_empty() {
                log::warn!("window {start}..{end} returned no rows, nothing to append");
                continue;
            }

            let factors = norm_factors(&stitched, &rows, keywords.len()).ok_or_else(|| {
                PipelineError::no_data(format!(
                    "window {start}..{end} shares no dates with the stitched series"
                ))
            })?;
            let factors: Vec<f64> = factors
                .into_iter()
                .zip(keywords)
                .map(|(factor, keyword)| {
                    factor.unwrap_or_else(|| {
                        log::warn!(
                            "window {start}..{end}: no finite overlap ratio for '{keyword}', keeping its scale"
                        );
                        1.0
                    })
                })
                .collect();
            log::debug!("window {start}..{end}: norm factors {factors:?}");

            for mut row in rows {
                if stitched.contains_key(&row.date) {
                    continue;
                }
                for (v, f) in row.values.iter_mut().zip(&factors) {
                    *v *= f;
                }
                stitched.insert(row.date, row);
            }
        }

        let mut rows: Vec<TrendRow> = stitched.into_values().filter(|r| r.date >= from).collect();

        if opts.scale {
            normalize_to_100(&mut rows);
        }
        if !opts.keep_partial {
            for row in &mut rows {
                row.is_partial = false;
            }
        }
        rows.reverse();

        log::info!("stitched {} trend rows", rows.len());
        Ok(TrendFrame {
            keywords: keywords.to_vec(),
            rows,
            partial_column: opts.keep_partial,
        })
    }

    fn query(&self, keywords: &[String], start: NaiveDate, end: NaiveDate) -> Result<Vec<TrendRow>> {
        let window = TrendQueryWindow::new(start, end, keywords);
        log::debug!("querying {} for {}", self.source.name(), window.timeframe());
        let rows = self.source.query(&window)?;
        if let Some(bad) = rows.iter().find(|r| r.values.len() != keywords.len()) {
            return Err(SourceError::ResponseFormatChanged(format!(
                "row {} has {} values for {} keywords",
                bad.date,
                bad.values.len(),
                keywords.len()
            ))
            .into());
        }
        Ok(rows)
    }
}

fn validate_keywords(keywords: &[String]) -> Result<()> {
    if keywords.is_empty() || keywords.len() > MAX_KEYWORDS {
        return Err(PipelineError::validation(format!(
            "keyword list must contain 1 to {MAX_KEYWORDS} terms (got {})",
            keywords.len()
        )));
    }
    if keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(PipelineError::validation("keywords must not be blank"));
    }
    let distinct: HashSet<&str> = keywords.iter().map(String::as_str).collect();
    if distinct.len() != keywords.len() {
        return Err(PipelineError::validation(format!(
            "keywords must be distinct: {keywords:?}"
        )));
    }
    Ok(())
}

/// Per-keyword mean of `existing / new` over dates present in both.
///
/// Returns `None` when the window shares no date with the stitched series.
/// A keyword with no finite ratio (zeros across the overlap) gets `None` on
/// its own, leaving the other keywords' factors intact.
fn norm_factors(
    stitched: &BTreeMap<NaiveDate, TrendRow>,
    rows: &[TrendRow],
    n_keywords: usize,
) -> Option<Vec<Option<f64>>> {
    let shared: Vec<(&TrendRow, &TrendRow)> = rows
        .iter()
        .filter_map(|r| stitched.get(&r.date).map(|old| (old, r)))
        .collect();
    if shared.is_empty() {
        return None;
    }
    let factors = (0..n_keywords)
        .map(|k| {
            let (sum, count) = shared
                .iter()
                .map(|(old, new)| old.values[k] / new.values[k])
                .filter(|ratio| ratio.is_finite())
                .fold((0.0, 0usize), |(s, c), ratio| (s + ratio, c + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect();
    Some(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn opts(trdays: u32, overlap: u32) -> StitchOptions {
        StitchOptions {
            trdays,
            overlap,
            scale: false,
            pause: std::time::Duration::ZERO,
            ..StitchOptions::default()
        }
    }

    /// Answers each query from a closure over the date, recording every window.
    struct FnSource<F: Fn(NaiveDate, &TrendQueryWindow) -> f64 + Send + Sync> {
        value: F,
        calls: Mutex<Vec<TrendQueryWindow>>,
    }

    impl<F: Fn(NaiveDate, &TrendQueryWindow) -> f64 + Send + Sync> FnSource<F> {
        fn new(value: F) -> Self {
            Self {
                value,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl<F: Fn(NaiveDate, &TrendQueryWindow) -> f64 + Send + Sync> TrendSource for FnSource<F> {
        fn name(&self) -> &str {
            "fn"
        }

        fn query(&self, w: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
            self.calls.lock().unwrap().push(w.clone());
            let mut rows = Vec::new();
            let mut date = w.start;
            while date <= w.end {
                rows.push(TrendRow {
                    date,
                    values: vec![(self.value)(date, w); w.keywords.len()],
                    is_partial: false,
                });
                date += Duration::days(1);
            }
            Ok(rows)
        }
    }

    struct EmptySource;

    impl TrendSource for EmptySource {
        fn name(&self) -> &str {
            "empty"
        }

        fn query(&self, _: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn single_window_when_range_fits() {
        let w = plan_windows(d("2024-01-01"), d("2024-03-01"), 250, 100, false);
        assert_eq!(w, vec![(d("2024-01-01"), d("2024-03-01"))]);
    }

    #[test]
    fn windows_walk_backwards_by_stride() {
        // 7 days, trdays 4, overlap 1 -> stride 3
        let w = plan_windows(d("2024-01-01"), d("2024-01-08"), 4, 1, false);
        assert_eq!(
            w,
            vec![
                (d("2024-01-04"), d("2024-01-08")),
                (d("2024-01-01"), d("2024-01-05")),
            ]
        );
        let fwd = plan_windows(d("2024-01-01"), d("2024-01-08"), 4, 1, true);
        assert_eq!(fwd[0], (d("2024-01-01"), d("2024-01-05")));
    }

    #[test]
    fn oldest_window_reaches_from_date() {
        let from = d("2020-01-01");
        let to = d("2023-06-15");
        let w = plan_windows(from, to, 250, 100, false);
        assert!(w.last().unwrap().0 <= from);
        for pair in w.windows(2) {
            // consecutive windows share overlap + 1 dates
            assert_eq!((pair[0].0 - pair[1].0).num_days(), 150);
            assert_eq!((pair[1].1 - pair[0].0).num_days(), 100);
        }
    }

    #[test]
    fn rejects_bad_inputs_before_querying() {
        let src = FnSource::new(|_, _| 1.0);
        let from = d("2024-01-01");
        let to = d("2024-02-01");

        let cases: Vec<(Vec<String>, StitchOptions)> = vec![
            (kw(&[]), opts(250, 100)),
            (kw(&["a", "b", "c", "d", "e", "f"]), opts(250, 100)),
            (kw(&["a", "a"]), opts(250, 100)),
            (kw(&["bitcoin"]), opts(271, 100)),
            (kw(&["bitcoin"]), opts(100, 100)),
        ];
        for (keywords, o) in cases {
            let err = TrendStitcher::new(&src, o).stitch(&keywords, from, to).unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)), "{err}");
        }
        let err = TrendStitcher::new(&src, opts(250, 100))
            .stitch(&kw(&["bitcoin"]), to, from)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(src.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_first_window_is_no_data() {
        let err = TrendStitcher::new(&EmptySource, opts(250, 100))
            .stitch(&kw(&["zzqx"]), d("2024-01-01"), d("2024-02-01"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData(_)));
    }

    #[test]
    fn overlap_ratio_sets_the_norm_factor() {
        // Window 1 (recent, 01-04..01-08) reports 80 on 01-04 and 120 on 01-05.
        // Window 2 (01-01..01-05) reports 40 and 60 for those dates: factor 2.0.
        let src = FnSource::new(|date, w| {
            let recent = w.end == d("2024-01-08");
            match (recent, date.format("%d").to_string().as_str()) {
                (true, "04") => 80.0,
                (true, "05") => 120.0,
                (true, _) => 100.0,
                (false, "04") => 40.0,
                (false, "05") => 60.0,
                (false, _) => 10.0,
            }
        });
        let frame = TrendStitcher::new(&src, opts(4, 1))
            .stitch(&kw(&["bitcoin"]), d("2024-01-01"), d("2024-01-08"))
            .unwrap();

        let series = frame.series("bitcoin").unwrap();
        let dates: Vec<String> = series.iter().map(|(d, _)| d.to_string()).collect();
        assert_eq!(dates.first().unwrap(), "2024-01-08");
        assert_eq!(dates.last().unwrap(), "2024-01-01");
        assert_eq!(series.len(), 8);

        let value = |s: &str| series.iter().find(|(d0, _)| *d0 == d(s)).unwrap().1;
        // overlap dates keep the first window's values
        assert_eq!(value("2024-01-04"), 80.0);
        assert_eq!(value("2024-01-05"), 120.0);
        // appended dates are rescaled by 2.0
        assert_eq!(value("2024-01-01"), 20.0);
        assert_eq!(value("2024-01-03"), 20.0);
        assert_eq!(src.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn scaling_peaks_at_100_across_keywords() {
        let src = FnSource::new(|date, _| f64::from(date.format("%d").to_string().parse::<u8>().unwrap()));
        let mut o = opts(250, 100);
        o.scale = true;
        let frame = TrendStitcher::new(&src, o)
            .stitch(&kw(&["a", "b"]), d("2024-01-01"), d("2024-01-20"))
            .unwrap();
        assert_eq!(frame.rows[0].values, vec![100.0, 100.0]);
        assert_eq!(frame.rows[19].values, vec![5.0, 5.0]);
    }

    #[test]
    fn partial_flags_dropped_unless_requested() {
        struct PartialTail;
        impl TrendSource for PartialTail {
            fn name(&self) -> &str {
                "partial"
            }
            fn query(&self, w: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
                Ok(vec![
                    TrendRow { date: w.start, values: vec![50.0], is_partial: false },
                    TrendRow { date: w.end, values: vec![100.0], is_partial: true },
                ])
            }
        }

        let keywords = kw(&["bitcoin"]);
        let dropped = TrendStitcher::new(&PartialTail, opts(250, 100))
            .stitch(&keywords, d("2024-01-01"), d("2024-01-02"))
            .unwrap();
        assert!(!dropped.partial_column);
        assert!(dropped.rows.iter().all(|r| !r.is_partial));

        let mut o = opts(250, 100);
        o.keep_partial = true;
        let kept = TrendStitcher::new(&PartialTail, o)
            .stitch(&keywords, d("2024-01-01"), d("2024-01-02"))
            .unwrap();
        assert!(kept.partial_column);
        assert!(kept.rows[0].is_partial);
        assert!(!kept.rows[1].is_partial);
    }

    #[test]
    fn source_failure_aborts_the_stitch() {
        struct FailSecond(Mutex<usize>);
        impl TrendSource for FailSecond {
            fn name(&self) -> &str {
                "flaky"
            }
            fn query(&self, w: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
                let mut n = self.0.lock().unwrap();
                *n += 1;
                if *n > 1 {
                    return Err(SourceError::RateLimited { retry_after_secs: 60 });
                }
                Ok(vec![TrendRow { date: w.end, values: vec![1.0], is_partial: false }])
            }
        }

        let err = TrendStitcher::new(&FailSecond(Mutex::new(0)), opts(4, 1))
            .stitch(&kw(&["bitcoin"]), d("2024-01-01"), d("2024-01-08"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ExternalSource(SourceError::RateLimited { .. })
        ));
    }

    #[test]
    fn keyword_without_finite_ratio_keeps_the_others() {
        struct ZeroInOlder;
        impl TrendSource for ZeroInOlder {
            fn name(&self) -> &str {
                "zero_in_older"
            }
            fn query(&self, w: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
                let recent = w.end == d("2024-01-08");
                let mut rows = Vec::new();
                let mut date = w.start;
                while date <= w.end {
                    let aux = if recent { 1.0 } else { 0.0 };
                    rows.push(TrendRow { date, values: vec![50.0, aux], is_partial: false });
                    date += Duration::days(1);
                }
                Ok(rows)
            }
        }
        let frame = TrendStitcher::new(&ZeroInOlder, opts(4, 1))
            .stitch(&kw(&["bitcoin", "zzqx"]), d("2024-01-01"), d("2024-01-08"))
            .unwrap();

        assert_eq!(frame.dates().last(), Some(d("2024-01-01")));
        let bitcoin = frame.series("bitcoin").unwrap();
        assert!(bitcoin.iter().all(|&(_, v)| v == 50.0));
        let aux = frame.series("zzqx").unwrap();
        assert_eq!(aux.iter().find(|(date, _)| *date == d("2024-01-08")).map(|p| p.1), Some(1.0));
        assert_eq!(aux.iter().find(|(date, _)| *date == d("2024-01-01")).map(|p| p.1), Some(0.0));
    }

    #[test]
    fn disjoint_window_cannot_be_rescaled() {
        struct Disjoint;
        impl TrendSource for Disjoint {
            fn name(&self) -> &str {
                "disjoint"
            }
            fn query(&self, w: &TrendQueryWindow) -> std::result::Result<Vec<TrendRow>, SourceError> {
                // only ever answers the window's first day
                Ok(vec![TrendRow { date: w.start, values: vec![5.0], is_partial: false }])
            }
        }
        let err = TrendStitcher::new(&Disjoint, opts(4, 1))
            .stitch(&kw(&["bitcoin"]), d("2024-01-01"), d("2024-01-08"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData(_)));
    }
}
