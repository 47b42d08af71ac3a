// 📉 Price levels and series comparison
// Raw index levels over a month range, and several series rebased to 100 at
// their first observation in range so they share one axis.

use crate::calendar::YearMonth;
use crate::db::Observation;
use crate::error::{PpiError, Result};
use crate::provider::SeriesProvider;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Value every rebased series starts from
pub const REBASE_VALUE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebasedSeries {
    pub series_id: String,
    pub series_title: Option<String>,
    pub points: Vec<LevelPoint>,
}

impl RebasedSeries {
    /// Series title when known, id otherwise
    pub fn label(&self) -> &str {
        self.series_title.as_deref().unwrap_or(&self.series_id)
    }
}

/// Observations whose month lies in the range; either bound may be open
pub fn price_levels(
    series: &[Observation],
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<Vec<LevelPoint>> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(PpiError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
    }

    Ok(series
        .iter()
        .filter(|obs| {
            let ym = obs.year_month();
            start.map_or(true, |s| ym >= s) && end.map_or(true, |e| ym <= e)
        })
        .map(|obs| LevelPoint {
            date: obs.date(),
            value: obs.value,
        })
        .collect())
}

/// Scale so the first point equals `REBASE_VALUE`.
/// `None` when the first value is zero or not finite.
pub fn rebase_to_first(points: &[LevelPoint]) -> Option<Vec<LevelPoint>> {
    let base = match points.first() {
        Some(first) => first.value,
        None => return Some(Vec::new()),
    };

    if base == 0.0 || !base.is_finite() {
        return None;
    }

    Some(
        points
            .iter()
            .map(|p| LevelPoint {
                date: p.date,
                value: p.value / base * REBASE_VALUE,
            })
            .collect(),
    )
}

/// Each series rebased to its first observation in range.
/// A series that cannot be rebased (zero first value) is left out with a warning.
pub fn compare_series<P: SeriesProvider + ?Sized>(
    provider: &P,
    series_ids: &[String],
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<Vec<RebasedSeries>> {
    let mut compared = Vec::with_capacity(series_ids.len());

    for series_id in series_ids {
        let series = provider.get_series_data(series_id)?;
        let levels = price_levels(&series, start, end)?;

        let points = match rebase_to_first(&levels) {
            Some(points) => points,
            None => {
                warn!(series_id = %series_id, "first value in range is zero, cannot rebase");
                continue;
            }
        };

        let series_title = provider
            .get_series_metadata(series_id)
            .ok()
            .map(|meta| meta.series_title)
            .filter(|title| !title.trim().is_empty());

        compared.push(RebasedSeries {
            series_id: series_id.clone(),
            series_title,
            points,
        });
    }

    Ok(compared)
}

/// One row per date present in any series, one cell per series
pub fn align_by_date(series: &[RebasedSeries]) -> Vec<(NaiveDate, Vec<Option<f64>>)> {
    let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();

    for (i, s) in series.iter().enumerate() {
        for point in &s.points {
            rows.entry(point.date).or_insert_with(|| vec![None; series.len()])[i] = Some(point.value);
        }
    }

    rows.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Period;
    use crate::db::SeriesMetadata;
    use crate::provider::InMemoryProvider;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    fn create_test_series(series_id: &str, start_month: u32, values: &[f64]) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation::new(series_id, 2023, Period::new(start_month + i as u32).unwrap(), v))
            .collect()
    }

    fn create_test_metadata(series_id: &str, title: &str) -> SeriesMetadata {
        SeriesMetadata {
            series_id: series_id.to_string(),
            group_code: "01".to_string(),
            item_code: String::new(),
            seasonal: "S".to_string(),
            base_date: "198200".to_string(),
            series_title: title.to_string(),
            footnote_codes: None,
            begin_year: Some(2023),
            begin_period: "M01".to_string(),
            end_year: Some(2023),
            end_period: "M05".to_string(),
        }
    }

    #[test]
    fn test_price_levels_filters_by_range() {
        let series = create_test_series("WPS0111", 1, &[100.0, 102.0, 104.0, 106.0, 108.0]);

        assert_eq!(price_levels(&series, None, None).unwrap().len(), 5);

        let from_march = price_levels(&series, Some(ym(2023, 3)), None).unwrap();
        assert_eq!(from_march.len(), 3);
        assert_eq!(from_march[0].date, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
        assert_eq!(from_march[0].value, 104.0);

        let window = price_levels(&series, Some(ym(2023, 2)), Some(ym(2023, 3))).unwrap();
        assert_eq!(window.len(), 2);

        assert!(price_levels(&series, Some(ym(2024, 1)), None).unwrap().is_empty());
        assert!(matches!(
            price_levels(&series, Some(ym(2023, 3)), Some(ym(2023, 1))),
            Err(PpiError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_rebase_to_first() {
        let levels = price_levels(&create_test_series("WPS0112", 1, &[90.0, 99.0, 108.0]), None, None).unwrap();

        let rebased = rebase_to_first(&levels).unwrap();
        let values: Vec<f64> = rebased.iter().map(|p| p.value).collect();
        assert_eq!(values[0], 100.0);
        assert!((values[1] - 110.0).abs() < 1e-9);
        assert!((values[2] - 120.0).abs() < 1e-9);
        assert_eq!(rebased[2].date, levels[2].date);

        assert_eq!(rebase_to_first(&[]), Some(Vec::new()));
    }

    #[test]
    fn test_rebase_zero_base_is_absent() {
        let levels = price_levels(&create_test_series("X", 1, &[0.0, 5.0]), None, None).unwrap();
        assert_eq!(rebase_to_first(&levels), None);
    }

    #[test]
    fn test_compare_series_rebases_within_range() {
        let mut provider = InMemoryProvider::new();
        provider.insert_series("WPS0111", create_test_series("WPS0111", 1, &[100.0, 102.0, 104.0, 106.0, 108.0]));
        provider.insert_series("WPS0112", create_test_series("WPS0112", 1, &[90.0, 93.0, 96.0, 99.0, 102.0]));
        provider.insert_metadata(create_test_metadata("WPS0111", "Fresh fruits"));

        let ids = vec!["WPS0111".to_string(), "WPS0112".to_string()];
        let compared = compare_series(&provider, &ids, Some(ym(2023, 2)), None).unwrap();

        assert_eq!(compared.len(), 2);
        assert_eq!(compared[0].label(), "Fresh fruits");
        assert_eq!(compared[1].label(), "WPS0112");

        // Base is February, the first month in range
        assert_eq!(compared[0].points[0].value, 100.0);
        assert!((compared[0].points[3].value - 108.0 / 102.0 * 100.0).abs() < 1e-9);
        assert_eq!(compared[1].points[0].value, 100.0);
        assert!((compared[1].points[3].value - 102.0 / 93.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_series_errors() {
        let mut provider = InMemoryProvider::new();
        provider.insert_series("ZERO", create_test_series("ZERO", 1, &[0.0, 1.0]));

        let ids = vec!["ZERO".to_string()];
        assert!(compare_series(&provider, &ids, None, None).unwrap().is_empty());

        let unknown = vec!["NOPE".to_string()];
        assert!(matches!(
            compare_series(&provider, &unknown, None, None),
            Err(PpiError::SeriesNotFound(_))
        ));
    }

    #[test]
    fn test_align_by_date() {
        let a = RebasedSeries {
            series_id: "A".to_string(),
            series_title: None,
            points: rebase_to_first(&price_levels(&create_test_series("A", 1, &[10.0, 11.0]), None, None).unwrap()).unwrap(),
        };
        let b = RebasedSeries {
            series_id: "B".to_string(),
            series_title: None,
            points: rebase_to_first(&price_levels(&create_test_series("B", 2, &[50.0, 40.0]), None, None).unwrap()).unwrap(),
        };

        let rows = align_by_date(&[a, b]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1, vec![Some(100.0), None]);
        assert_eq!(rows[1].1[1], Some(100.0));
        assert_eq!(rows[2].1, vec![None, Some(80.0)]);
    }
}
