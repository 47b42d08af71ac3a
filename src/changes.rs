// 📊 Change-Series Builder
// Applies the rolling-change engine across a whole series, one ChangeRecord per
// observation in the requested range.
//
// Lookback is POSITIONAL over the FULL series: the prior for window w at position i
// is position i - w, even when that point lies before the range start. Gaps in the
// monthly sequence are not detected; a "3-month" change across a missing month
// really spans 4 calendar months. Filling gaps is the ingestion side's job.

use crate::calendar::YearMonth;
use crate::db::Observation;
use crate::error::{PpiError, Result};
use crate::provider::SeriesProvider;
use crate::rolling::annualized_change;
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::debug;

/// 1, 3, 6 and 12 months
pub const DEFAULT_WINDOWS: [u32; 4] = [1, 3, 6, 12];

/// Months covered when a query gives no start month
pub const DEFAULT_SPAN_MONTHS: i64 = 24;

// ============================================================================
// LOOKBACK WINDOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LookbackWindow(u32);

impl LookbackWindow {
    pub fn new(months: u32) -> Result<Self> {
        if months == 0 {
            return Err(PpiError::InvalidWindow(
                "lookback window must be at least 1 month".to_string(),
            ));
        }
        Ok(LookbackWindow(months))
    }

    pub fn months(&self) -> u32 {
        self.0
    }

    /// Column label, e.g. "ann_3m"
    pub fn column(&self) -> String {
        format!("ann_{}m", self.0)
    }

    pub fn defaults() -> Vec<LookbackWindow> {
        DEFAULT_WINDOWS.iter().map(|&m| LookbackWindow(m)).collect()
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// Validate a caller-supplied window list. Empty, zero-month or repeated
/// windows are caller errors.
pub fn parse_windows(months: &[u32]) -> Result<Vec<LookbackWindow>> {
    if months.is_empty() {
        return Err(PpiError::InvalidWindow("no lookback windows given".to_string()));
    }

    let mut windows: Vec<LookbackWindow> = Vec::with_capacity(months.len());
    for &m in months {
        let window = LookbackWindow::new(m)?;
        if windows.contains(&window) {
            return Err(PpiError::InvalidWindow(format!("window {}m given more than once", m)));
        }
        windows.push(window);
    }
    Ok(windows)
}

// ============================================================================
// CHANGE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WindowChange {
    pub window: LookbackWindow,
    /// Annualized percent change; None when history is insufficient or undefined
    pub annualized: Option<f64>,
}

/// Derived per-observation row. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub date: NaiveDate,
    pub value: f64,
    /// One entry per configured window, in window order
    pub changes: Vec<WindowChange>,
}

impl ChangeRecord {
    /// Annualized change for a window length, if that window was computed and present
    pub fn ann(&self, months: u32) -> Option<f64> {
        self.changes
            .iter()
            .find(|c| c.window.months() == months)
            .and_then(|c| c.annualized)
    }

    pub fn ann_1m(&self) -> Option<f64> {
        self.ann(1)
    }

    pub fn ann_3m(&self) -> Option<f64> {
        self.ann(3)
    }

    pub fn ann_6m(&self) -> Option<f64> {
        self.ann(6)
    }

    pub fn ann_12m(&self) -> Option<f64> {
        self.ann(12)
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }
}

// Flat shape: {"date": "2020-01-01", "value": 101.2, "ann_1m": 3.4, "ann_3m": null, ...}
impl Serialize for ChangeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.changes.len()))?;
        map.serialize_entry("date", &self.date)?;
        map.serialize_entry("value", &self.value)?;
        for change in &self.changes {
            map.serialize_entry(&change.window.column(), &change.annualized)?;
        }
        map.end()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Change record for the observation at `index` of the full series
fn record_at(series: &[Observation], index: usize, windows: &[LookbackWindow]) -> Result<ChangeRecord> {
    let current = &series[index];

    let changes = windows
        .iter()
        .map(|window| {
            let prior = index
                .checked_sub(window.months() as usize)
                .map(|j| series[j].value);

            Ok(WindowChange {
                window: *window,
                annualized: annualized_change(current.value, prior, window.months())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ChangeRecord {
        date: current.date(),
        value: current.value,
        changes,
    })
}

/// One ChangeRecord per observation whose month lies in `[start, end]`
///
/// `series` must be the full ascending series; it is never sorted or filtered
/// before the lookback.
pub fn build_change_series(
    series: &[Observation],
    start: YearMonth,
    end: YearMonth,
    windows: &[LookbackWindow],
) -> Result<Vec<ChangeRecord>> {
    if end < start {
        return Err(PpiError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut records = Vec::new();

    for (i, obs) in series.iter().enumerate() {
        let ym = obs.year_month();
        if ym < start || ym > end {
            continue;
        }
        records.push(record_at(series, i, windows)?);
    }

    Ok(records)
}

/// Rolling-change query: annualized changes for `series_id` between
/// (start_year, start_month) and (end_year, end_month) inclusive
///
/// Caller errors (`InvalidPeriod`, `InvalidRange`, `InvalidWindow`) are checked
/// before the provider is touched; `SeriesNotFound` comes from the provider.
pub fn compute_changes<P: SeriesProvider + ?Sized>(
    provider: &P,
    series_id: &str,
    start_year: i32,
    start_month: u32,
    end_year: i32,
    end_month: u32,
    windows: &[u32],
) -> Result<Vec<ChangeRecord>> {
    let start = YearMonth::new(start_year, start_month)?;
    let end = YearMonth::new(end_year, end_month)?;

    if end < start {
        return Err(PpiError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let windows = parse_windows(windows)?;
    let series = provider.get_series_data(series_id)?;

    debug!(series_id, %start, %end, observations = series.len(), "computing changes");

    build_change_series(&series, start, end, &windows)
}

/// Snapshot of the most recent observation at or before `as_of`
/// (or the last observation when `as_of` is None). `None` for an empty series
/// or when nothing precedes `as_of`.
pub fn latest_changes<P: SeriesProvider + ?Sized>(
    provider: &P,
    series_id: &str,
    as_of: Option<YearMonth>,
    windows: &[u32],
) -> Result<Option<ChangeRecord>> {
    let windows = parse_windows(windows)?;
    let series = provider.get_series_data(series_id)?;

    let index = series
        .iter()
        .rposition(|obs| as_of.map_or(true, |limit| obs.year_month() <= limit));

    match index {
        Some(i) => Ok(Some(record_at(&series, i, &windows)?)),
        None => Ok(None),
    }
}

/// Fill in a missing query range: `end` defaults to the last observation,
/// `start` to `DEFAULT_SPAN_MONTHS` months ending at `end`. A given `start`
/// past the last observation pulls a defaulted `end` up to it, so the range
/// stays valid and simply selects nothing. `None` when the series is empty
/// and no end was given.
pub fn default_range(
    series: &[Observation],
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<Option<(YearMonth, YearMonth)>> {
    let end = match (end, series.last().map(|obs| obs.year_month())) {
        (Some(end), _) => end,
        (None, Some(last)) => match start {
            Some(start) if start > last => start,
            _ => last,
        },
        (None, None) => return Ok(None),
    };

    let start = match start {
        Some(start) => start,
        None => end.add_months(1 - DEFAULT_SPAN_MONTHS)?,
    };

    Ok(Some((start, end)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Period;
    use crate::provider::InMemoryProvider;

    const TOLERANCE: f64 = 0.1;

    /// `count` consecutive months from `start`, growing by `factor` each month
    fn constant_growth_series(
        series_id: &str,
        start: YearMonth,
        count: usize,
        first_value: f64,
        factor: f64,
    ) -> Vec<Observation> {
        (0..count)
            .map(|k| {
                let ym = start.add_months(k as i64).unwrap();
                Observation::new(
                    series_id,
                    ym.year,
                    Period::new(ym.month).unwrap(),
                    first_value * factor.powi(k as i32),
                )
            })
            .collect()
    }

    fn obs(year: i32, month: u32, value: f64) -> Observation {
        Observation::new("TEST", year, Period::new(month).unwrap(), value)
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    fn provider_with(series_id: &str, observations: Vec<Observation>) -> InMemoryProvider {
        let mut provider = InMemoryProvider::new();
        provider.insert_series(series_id, observations);
        provider
    }

    #[test]
    fn test_constant_growth_full_range() {
        // 13 months, +1% per month
        let series = constant_growth_series("WPU0111", ym(2022, 1), 13, 100.0, 1.01);
        let provider = provider_with("WPU0111", series);

        let records =
            compute_changes(&provider, "WPU0111", 2022, 1, 2023, 1, &DEFAULT_WINDOWS).unwrap();
        assert_eq!(records.len(), 13);

        let expected = (1.01f64.powi(12) - 1.0) * 100.0;
        let last = &records[12];

        assert!((last.ann_1m().unwrap() - 12.68).abs() < TOLERANCE);
        assert!((last.ann_3m().unwrap() - expected).abs() < TOLERANCE);
        assert!((last.ann_6m().unwrap() - expected).abs() < TOLERANCE);
        assert!((last.ann_12m().unwrap() - expected).abs() < TOLERANCE);

        // The very first record has no history at all
        assert_eq!(records[0].ann_1m(), None);
        assert_eq!(records[0].ann_12m(), None);
    }

    #[test]
    fn test_two_observations() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0), obs(2023, 2, 101.0)]);

        let records =
            compute_changes(&provider, "WPU0111", 2023, 1, 2023, 12, &DEFAULT_WINDOWS).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].ann_1m(), None);
        assert!(records[1].ann_1m().is_some());

        for record in &records {
            assert_eq!(record.ann_3m(), None);
            assert_eq!(record.ann_6m(), None);
            assert_eq!(record.ann_12m(), None);
        }
    }

    #[test]
    fn test_unknown_series() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0)]);

        let result = compute_changes(&provider, "UNKNOWN_ID", 2015, 1, 2020, 12, &DEFAULT_WINDOWS);
        assert!(matches!(result, Err(PpiError::SeriesNotFound(id)) if id == "UNKNOWN_ID"));
    }

    #[test]
    fn test_end_before_start() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0)]);

        let result = compute_changes(&provider, "WPU0111", 2020, 12, 2015, 1, &DEFAULT_WINDOWS);
        assert!(matches!(result, Err(PpiError::InvalidRange { .. })));

        // Range is checked before the provider: still InvalidRange for an unknown id
        let result = compute_changes(&provider, "UNKNOWN_ID", 2020, 12, 2015, 1, &DEFAULT_WINDOWS);
        assert!(matches!(result, Err(PpiError::InvalidRange { .. })));
    }

    #[test]
    fn test_missing_month_spans_more_calendar_months() {
        // March is missing. Lookback is positional, so the "3-month" change at May
        // compares against January: four calendar months apart.
        let series = vec![
            obs(2023, 1, 100.0),
            obs(2023, 2, 101.0),
            obs(2023, 4, 103.0),
            obs(2023, 5, 104.0),
        ];

        let records =
            build_change_series(&series, ym(2023, 1), ym(2023, 5), &LookbackWindow::defaults()).unwrap();
        let may = records.last().unwrap();
        assert_eq!(may.year_month(), ym(2023, 5));

        let positional = annualized_change(104.0, Some(100.0), 3).unwrap();
        let calendar_correct = annualized_change(104.0, Some(101.0), 3).unwrap();

        assert_eq!(may.ann_3m(), positional);
        assert_ne!(may.ann_3m(), calendar_correct);
        assert_eq!(may.year_month().months_since(&series[0].year_month()), 4);

        // The "1-month" change at April really spans two months (Feb -> Apr)
        let april = &records[2];
        assert_eq!(april.ann_1m(), annualized_change(103.0, Some(101.0), 1).unwrap());
    }

    #[test]
    fn test_lookback_reaches_before_range_start() {
        // Two years of data, query only the second year
        let series = constant_growth_series("WPU0111", ym(2021, 1), 24, 100.0, 1.005);
        let provider = provider_with("WPU0111", series);

        let records =
            compute_changes(&provider, "WPU0111", 2022, 1, 2022, 12, &DEFAULT_WINDOWS).unwrap();
        assert_eq!(records.len(), 12);

        // Every window is available from the first in-range month on
        let first = &records[0];
        assert_eq!(first.year_month(), ym(2022, 1));
        assert!(first.ann_1m().is_some());
        assert!(first.ann_3m().is_some());
        assert!(first.ann_6m().is_some());
        assert!(first.ann_12m().is_some());
    }

    #[test]
    fn test_mixed_presence_near_series_start() {
        let series = constant_growth_series("WPU0111", ym(2023, 1), 8, 100.0, 1.01);
        let records =
            build_change_series(&series, ym(2023, 1), ym(2023, 12), &LookbackWindow::defaults()).unwrap();

        // Position 4 (May): 1m and 3m present, 6m and 12m absent
        let may = &records[4];
        assert!(may.ann_1m().is_some());
        assert!(may.ann_3m().is_some());
        assert_eq!(may.ann_6m(), None);
        assert_eq!(may.ann_12m(), None);
    }

    #[test]
    fn test_range_without_data_is_empty() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0), obs(2023, 2, 101.0)]);

        let records =
            compute_changes(&provider, "WPU0111", 2015, 1, 2020, 12, &DEFAULT_WINDOWS).unwrap();
        assert!(records.is_empty());

        let empty = provider_with("EMPTY", Vec::new());
        let records = compute_changes(&empty, "EMPTY", 2015, 1, 2020, 12, &DEFAULT_WINDOWS).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_single_month_range() {
        let series = constant_growth_series("WPU0111", ym(2023, 1), 6, 100.0, 1.01);
        let records =
            build_change_series(&series, ym(2023, 4), ym(2023, 4), &LookbackWindow::defaults()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year_month(), ym(2023, 4));
        assert!(records[0].ann_3m().is_some());
    }

    #[test]
    fn test_compute_changes_is_idempotent() {
        let series = constant_growth_series("WPU0111", ym(2020, 1), 30, 100.0, 1.003);
        let provider = provider_with("WPU0111", series);

        let first = compute_changes(&provider, "WPU0111", 2020, 6, 2022, 6, &DEFAULT_WINDOWS).unwrap();
        let second = compute_changes(&provider, "WPU0111", 2020, 6, 2022, 6, &DEFAULT_WINDOWS).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.value.to_bits(), b.value.to_bits());
            for (ca, cb) in a.changes.iter().zip(b.changes.iter()) {
                assert_eq!(ca.annualized.map(f64::to_bits), cb.annualized.map(f64::to_bits));
            }
        }
    }

    #[test]
    fn test_custom_windows() {
        let series = constant_growth_series("WPU0111", ym(2020, 1), 30, 100.0, 1.01);
        let provider = provider_with("WPU0111", series);

        let records = compute_changes(&provider, "WPU0111", 2022, 1, 2022, 6, &[2, 24]).unwrap();
        let first = &records[0];

        assert_eq!(first.changes.len(), 2);
        assert!(first.ann(2).is_some());
        assert!(first.ann(24).is_some());
        // Windows that were not requested are simply absent
        assert_eq!(first.ann_1m(), None);
    }

    #[test]
    fn test_invalid_arguments() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0)]);

        assert!(matches!(
            compute_changes(&provider, "WPU0111", 2023, 0, 2023, 5, &DEFAULT_WINDOWS),
            Err(PpiError::InvalidPeriod(_))
        ));
        assert!(matches!(
            compute_changes(&provider, "WPU0111", 2023, 1, 2023, 13, &DEFAULT_WINDOWS),
            Err(PpiError::InvalidPeriod(_))
        ));
        assert!(matches!(
            compute_changes(&provider, "WPU0111", 2023, 1, 2023, 5, &[1, 0]),
            Err(PpiError::InvalidWindow(_))
        ));
        assert!(matches!(
            compute_changes(&provider, "WPU0111", 2023, 1, 2023, 5, &[]),
            Err(PpiError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_zero_base_inside_series() {
        let series = vec![obs(2023, 1, 0.0), obs(2023, 2, 5.0), obs(2023, 3, 6.0)];
        let records =
            build_change_series(&series, ym(2023, 1), ym(2023, 3), &LookbackWindow::defaults()).unwrap();

        // Feb over a zero Jan base is undefined, Mar over Feb is fine
        assert_eq!(records[1].ann_1m(), None);
        assert!(records[2].ann_1m().is_some());
    }

    #[test]
    fn test_latest_changes() {
        let series = constant_growth_series("WPU0111", ym(2022, 1), 24, 100.0, 1.01);
        let provider = provider_with("WPU0111", series);

        let latest = latest_changes(&provider, "WPU0111", None, &DEFAULT_WINDOWS)
            .unwrap()
            .unwrap();
        assert_eq!(latest.year_month(), ym(2023, 12));
        assert!((latest.ann_1m().unwrap() - 12.68).abs() < TOLERANCE);
        assert!(latest.ann_12m().unwrap() > 12.0 && latest.ann_12m().unwrap() < 13.0);

        let as_of = latest_changes(&provider, "WPU0111", Some(ym(2023, 6)), &DEFAULT_WINDOWS)
            .unwrap()
            .unwrap();
        assert_eq!(as_of.year_month(), ym(2023, 6));
        assert!((as_of.ann_1m().unwrap() - 12.68).abs() < TOLERANCE);

        let before_data = latest_changes(&provider, "WPU0111", Some(ym(2000, 1)), &DEFAULT_WINDOWS).unwrap();
        assert!(before_data.is_none());
    }

    #[test]
    fn test_latest_changes_insufficient_data() {
        let provider = provider_with("WPU0111", vec![obs(2023, 1, 100.0), obs(2023, 2, 101.0)]);

        let latest = latest_changes(&provider, "WPU0111", None, &DEFAULT_WINDOWS)
            .unwrap()
            .unwrap();
        assert!(latest.ann_1m().is_some());
        assert_eq!(latest.ann_3m(), None);
        assert_eq!(latest.ann_6m(), None);
        assert_eq!(latest.ann_12m(), None);
    }

    #[test]
    fn test_change_record_serializes_flat() {
        let record = ChangeRecord {
            date: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            value: 101.0,
            changes: vec![
                WindowChange {
                    window: LookbackWindow::new(1).unwrap(),
                    annualized: Some(12.5),
                },
                WindowChange {
                    window: LookbackWindow::new(12).unwrap(),
                    annualized: None,
                },
            ],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2023-02-01");
        assert_eq!(json["value"], 101.0);
        assert_eq!(json["ann_1m"], 12.5);
        assert!(json["ann_12m"].is_null());
        assert!(json.get("ann_3m").is_none());
    }

    #[test]
    fn test_default_range_last_24_months() {
        let series = vec![
            Observation::new("WPU01", 2022, Period::new(1).unwrap(), 100.0),
            Observation::new("WPU01", 2024, Period::new(6).unwrap(), 101.0),
        ];

        let (start, end) = default_range(&series, None, None).unwrap().unwrap();
        assert_eq!(end, YearMonth::new(2024, 6).unwrap());
        assert_eq!(start, YearMonth::new(2022, 7).unwrap());
        assert_eq!(end.months_since(&start) + 1, DEFAULT_SPAN_MONTHS);

        let explicit = YearMonth::new(2020, 1).unwrap();
        let (start, _) = default_range(&series, Some(explicit), None).unwrap().unwrap();
        assert_eq!(start, explicit);

        assert!(default_range(&[], None, None).unwrap().is_none());
    }

    #[test]
    fn test_default_range_start_after_last_observation() {
        let series = vec![
            Observation::new("WPU01", 2024, Period::new(5).unwrap(), 100.0),
            Observation::new("WPU01", 2024, Period::new(6).unwrap(), 101.0),
        ];
        let future = YearMonth::new(2030, 1).unwrap();

        let (start, end) = default_range(&series, Some(future), None).unwrap().unwrap();
        assert_eq!((start, end), (future, future));

        let mut provider = InMemoryProvider::new();
        provider.insert_series("WPU01", series);
        let records =
            compute_changes(&provider, "WPU01", start.year, start.month, end.year, end.month, &DEFAULT_WINDOWS)
                .unwrap();
        assert!(records.is_empty());

        // An explicit end before start is still the caller's mistake
        let early = YearMonth::new(2024, 1).unwrap();
        let (start, end) = default_range(&[], Some(future), Some(early)).unwrap().unwrap();
        assert!(matches!(
            compute_changes(&provider, "WPU01", start.year, start.month, end.year, end.month, &DEFAULT_WINDOWS),
            Err(PpiError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_parse_windows_rejects_repeats() {
        assert!(matches!(parse_windows(&[1, 1]), Err(PpiError::InvalidWindow(_))));
        assert!(matches!(parse_windows(&[3, 12, 3]), Err(PpiError::InvalidWindow(_))));

        let windows = parse_windows(&[12, 1]).unwrap();
        assert_eq!(windows.iter().map(|w| w.months()).collect::<Vec<_>>(), vec![12, 1]);
    }
}
