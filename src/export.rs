// 📤 CSV export of change series
// Columns: date, value, then one ann_Nm column per window. Absent changes are empty cells.

use crate::changes::{ChangeRecord, LookbackWindow};
use crate::error::Result;
use csv::Writer;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub fn write_changes_csv<W: Write>(
    writer: W,
    records: &[ChangeRecord],
    windows: &[LookbackWindow],
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    let mut header = vec!["date".to_string(), "value".to_string()];
    header.extend(windows.iter().map(|w| w.column()));
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![record.date.format("%Y-%m-%d").to_string(), record.value.to_string()];
        row.extend(
            windows
                .iter()
                .map(|w| record.ann(w.months()).map(|v| format!("{:.4}", v)).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_changes_csv(
    path: &Path,
    records: &[ChangeRecord],
    windows: &[LookbackWindow],
) -> Result<()> {
    let file = File::create(path)?;
    write_changes_csv(file, records, windows)?;
    info!(path = %path.display(), rows = records.len(), "exported change series");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{parse_windows, WindowChange};
    use chrono::NaiveDate;

    fn create_test_record(month: u32, value: f64, ann_1m: Option<f64>, ann_3m: Option<f64>) -> ChangeRecord {
        let windows = parse_windows(&[1, 3]).unwrap();
        ChangeRecord {
            date: NaiveDate::from_ymd_opt(2023, month, 1).unwrap(),
            value,
            changes: vec![
                WindowChange { window: windows[0], annualized: ann_1m },
                WindowChange { window: windows[1], annualized: ann_3m },
            ],
        }
    }

    #[test]
    fn test_write_changes_csv() {
        let windows = parse_windows(&[1, 3]).unwrap();
        let records = vec![
            create_test_record(1, 100.0, None, None),
            create_test_record(2, 101.0, Some(12.682503), None),
        ];

        let mut buffer = Vec::new();
        write_changes_csv(&mut buffer, &records, &windows).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "date,value,ann_1m,ann_3m");
        assert_eq!(lines[1], "2023-01-01,100,,");
        assert_eq!(lines[2], "2023-02-01,101,12.6825,");
    }

    #[test]
    fn test_export_to_file() {
        let windows = parse_windows(&[1, 3]).unwrap();
        let path = std::env::temp_dir().join(format!("ppi_export_{}.csv", uuid::Uuid::new_v4()));

        export_changes_csv(&path, &[create_test_record(3, 99.5, Some(-5.0), Some(1.25))], &windows).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("2023-03-01,99.5,-5.0000,1.2500"));

        std::fs::remove_file(&path).unwrap();
    }
}
