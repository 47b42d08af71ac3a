// 🏗️ BLS Flat-File Parser
// Tab-delimited time.series files: wp.series (metadata) and wp.data.* (observations).
//
// Fields are whitespace padded. Rows that cannot become a monthly observation
// (M13 annual averages, "-" values, short rows) are skipped and reported, never fatal.

use crate::calendar::Period;
use crate::db::{Observation, SeriesMetadata};
use crate::error::{PpiError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// FILE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatFileKind {
    /// wp.series - one row per series
    Series,
    /// wp.data.* - one row per observation
    Data,
}

impl FlatFileKind {
    pub fn name(&self) -> &str {
        match self {
            FlatFileKind::Series => "series metadata",
            FlatFileKind::Data => "observations",
        }
    }

    /// Detect the kind from a header line
    pub fn from_header(header: &str) -> Option<Self> {
        let columns: Vec<&str> = header.split('\t').map(|c| c.trim()).collect();

        if columns.contains(&"series_title") || columns.contains(&"group_code") {
            return Some(FlatFileKind::Series);
        }

        if columns.contains(&"value") && columns.contains(&"period") {
            return Some(FlatFileKind::Data);
        }

        None
    }
}

/// Detect file kind by peeking at the header line
pub fn detect_kind(file_path: &Path) -> Result<FlatFileKind> {
    let file = File::open(file_path)?;
    let mut header = String::new();
    BufReader::new(file).read_line(&mut header)?;

    FlatFileKind::from_header(&header).ok_or_else(|| {
        PpiError::Parse(format!(
            "Could not detect BLS file kind from header of {}",
            file_path.display()
        ))
    })
}

// ============================================================================
// PARSE REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line_number: u64,
    pub reason: String,
}

/// Parsed records plus everything that was left out
#[derive(Debug, Clone)]
pub struct ParseReport<T> {
    pub records: Vec<T>,
    pub rows_read: usize,
    pub skipped: Vec<SkippedRow>,
}

impl<T> ParseReport<T> {
    fn new() -> Self {
        ParseReport {
            records: Vec::new(),
            rows_read: 0,
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, line_number: u64, reason: String) {
        debug!(line_number, %reason, "skipping row");
        self.skipped.push(SkippedRow { line_number, reason });
    }

    fn log_summary(&self, kind: FlatFileKind) {
        if !self.skipped.is_empty() {
            warn!(
                kind = kind.name(),
                rows_read = self.rows_read,
                skipped = self.skipped.len(),
                "rows skipped while parsing"
            );
        }
    }
}

// ============================================================================
// RAW ROWS (as published)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDataRow {
    series_id: String,
    year: String,
    period: String,
    value: String,
    #[serde(default)]
    footnote_codes: String,
}

#[derive(Debug, Deserialize)]
struct RawSeriesRow {
    series_id: String,
    #[serde(default)]
    group_code: String,
    #[serde(default)]
    item_code: String,
    #[serde(default)]
    seasonal: String,
    #[serde(default)]
    base_date: String,
    #[serde(default)]
    series_title: String,
    #[serde(default)]
    footnote_codes: String,
    #[serde(default)]
    begin_year: String,
    #[serde(default)]
    begin_period: String,
    #[serde(default)]
    end_year: String,
    #[serde(default)]
    end_period: String,
}

fn tab_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .quoting(false)
        .from_reader(reader)
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// PARSERS
// ============================================================================

/// Parse a wp.data.* payload into observations
pub fn parse_data_file<R: Read>(reader: R) -> Result<ParseReport<Observation>> {
    let mut rdr = tab_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut report = ParseReport::new();

    for result in rdr.records() {
        let record = result?;
        let line = line_of(&record);
        report.rows_read += 1;

        let raw: RawDataRow = match record.deserialize(Some(&headers)) {
            Ok(raw) => raw,
            Err(e) => {
                report.skip(line, format!("malformed row: {}", e));
                continue;
            }
        };

        if raw.series_id.is_empty() {
            report.skip(line, "empty series_id".to_string());
            continue;
        }

        let year: i32 = match raw.year.parse() {
            Ok(y) => y,
            Err(_) => {
                report.skip(line, format!("bad year '{}'", raw.year));
                continue;
            }
        };

        let period: Period = match raw.period.parse() {
            Ok(p) => p,
            Err(_) => {
                report.skip(line, format!("non-monthly period '{}'", raw.period));
                continue;
            }
        };

        let value: f64 = match raw.value.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            Ok(_) => {
                report.skip(line, format!("non-finite value '{}'", raw.value));
                continue;
            }
            Err(_) => {
                report.skip(line, format!("non-numeric value '{}'", raw.value));
                continue;
            }
        };

        report.records.push(
            Observation::new(&raw.series_id, year, period, value).with_footnotes(&raw.footnote_codes),
        );
    }

    report.log_summary(FlatFileKind::Data);
    Ok(report)
}

/// Parse a wp.series payload into metadata rows
pub fn parse_series_file<R: Read>(reader: R) -> Result<ParseReport<SeriesMetadata>> {
    let mut rdr = tab_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut report = ParseReport::new();

    for result in rdr.records() {
        let record = result?;
        let line = line_of(&record);
        report.rows_read += 1;

        let raw: RawSeriesRow = match record.deserialize(Some(&headers)) {
            Ok(raw) => raw,
            Err(e) => {
                report.skip(line, format!("malformed row: {}", e));
                continue;
            }
        };

        if raw.series_id.is_empty() {
            report.skip(line, "empty series_id".to_string());
            continue;
        }

        report.records.push(SeriesMetadata {
            series_id: raw.series_id,
            group_code: raw.group_code,
            item_code: raw.item_code,
            seasonal: raw.seasonal,
            base_date: raw.base_date,
            series_title: raw.series_title,
            footnote_codes: non_empty(raw.footnote_codes),
            begin_year: raw.begin_year.parse().ok(),
            begin_period: raw.begin_period,
            end_year: raw.end_year.parse().ok(),
            end_period: raw.end_period,
        });
    }

    report.log_summary(FlatFileKind::Series);
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_SAMPLE: &str = "series_id                     \tyear\tperiod\t       value\tfootnote_codes\n\
WPU0111                       \t2023\tM01\t     100.0\t\n\
WPU0111                       \t2023\tM02\t     101.5\tP\n\
WPU0111                       \t2023\tM13\t     100.7\t\n\
WPU0111                       \t2023\tM03\t     -\t\n\
WPU0222                       \t2023\tM01\t      55.25\t\n";

    const SERIES_SAMPLE: &str = "series_id\tgroup_code\titem_code\tseasonal\tbase_date\tseries_title\tfootnote_codes\tbegin_year\tbegin_period\tend_year\tend_period\n\
WPU01                         \t01\t\tU\t198200\tFarm products\t\t1926\tM01\t2024\tM06\n\
WPU0111                       \t01\t11\tU\t198200\tFresh fruits and melons\t\t1947\tM01\t2024\tM06\n";

    #[test]
    fn test_parse_data_file() {
        let report = parse_data_file(DATA_SAMPLE.as_bytes()).unwrap();

        assert_eq!(report.rows_read, 5);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.skipped.len(), 2);

        let first = &report.records[0];
        assert_eq!(first.series_id, "WPU0111", "padding must be trimmed");
        assert_eq!(first.year, 2023);
        assert_eq!(first.period.month(), 1);
        assert_eq!(first.value, 100.0);
        assert_eq!(first.footnote_codes, None);

        assert_eq!(report.records[1].footnote_codes.as_deref(), Some("P"));
        assert_eq!(report.records[2].series_id, "WPU0222");
    }

    #[test]
    fn test_annual_average_and_dash_are_skipped() {
        let report = parse_data_file(DATA_SAMPLE.as_bytes()).unwrap();

        let reasons: Vec<&str> = report.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert!(reasons[0].contains("M13"));
        assert!(reasons[1].contains("non-numeric"));
        assert!(report.skipped.iter().all(|s| s.line_number > 1));
    }

    #[test]
    fn test_nan_and_infinite_values_are_skipped() {
        let data = "series_id\tyear\tperiod\tvalue\tfootnote_codes\n\
WPU0111\t2023\tM01\tNaN\t\n\
WPU0111\t2023\tM02\tinf\t\n\
WPU0111\t2023\tM03\t-infinity\t\n\
WPU0111\t2023\tM04\t102.0\t\n";

        let report = parse_data_file(data.as_bytes()).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].value, 102.0);
        assert_eq!(report.skipped.len(), 3);
        assert!(report.skipped.iter().all(|s| s.reason.contains("non-finite")));
    }

    #[test]
    fn test_parse_series_file() {
        let report = parse_series_file(SERIES_SAMPLE.as_bytes()).unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(report.skipped.is_empty());

        let group = &report.records[0];
        assert_eq!(group.series_id, "WPU01");
        assert_eq!(group.item_code, "");
        assert_eq!(group.footnote_codes, None);

        let fruits = &report.records[1];
        assert_eq!(fruits.series_title, "Fresh fruits and melons");
        assert_eq!(fruits.group_code, "01");
        assert_eq!(fruits.begin_year, Some(1947));
        assert_eq!(fruits.end_period, "M06");
    }

    #[test]
    fn test_detect_kind_from_header() {
        assert_eq!(
            FlatFileKind::from_header("series_id\tyear\tperiod\tvalue\tfootnote_codes"),
            Some(FlatFileKind::Data)
        );
        assert_eq!(
            FlatFileKind::from_header("series_id  \tgroup_code\titem_code\tseries_title"),
            Some(FlatFileKind::Series)
        );
        assert_eq!(FlatFileKind::from_header("Date,Description,Amount"), None);
    }

    #[test]
    fn test_detect_kind_from_file() {
        let path = std::env::temp_dir().join(format!("ppi_detect_{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, SERIES_SAMPLE).unwrap();

        assert_eq!(detect_kind(&path).unwrap(), FlatFileKind::Series);

        std::fs::remove_file(&path).unwrap();
    }
}
