// 🗄️ Series Store - SQLite persistence for PPI metadata + observations
// Schema: metadata (one row per series), commodities (one row per observation),
// import_runs (audit trail of every ingestion).

use crate::calendar::{Period, YearMonth};
use crate::error::{PpiError, Result};
use crate::provider::SeriesProvider;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// OBSERVATION
// ============================================================================

/// One monthly data point. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub series_id: String,
    pub year: i32,
    pub period: Period,
    pub value: f64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footnote_codes: Option<String>,
}

impl Observation {
    pub fn new(series_id: &str, year: i32, period: Period, value: f64) -> Self {
        Observation {
            series_id: series_id.to_string(),
            year,
            period,
            value,
            footnote_codes: None,
        }
    }

    pub fn with_footnotes(mut self, footnote_codes: &str) -> Self {
        if !footnote_codes.trim().is_empty() {
            self.footnote_codes = Some(footnote_codes.trim().to_string());
        }
        self
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.period.month(),
        }
    }

    /// First day of the observation's month
    pub fn date(&self) -> NaiveDate {
        self.year_month().first_day()
    }
}

// ============================================================================
// SERIES METADATA (wp.series)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series_id: String,
    pub group_code: String,
    pub item_code: String,
    pub seasonal: String,
    pub base_date: String,
    pub series_title: String,
    #[serde(default)]
    pub footnote_codes: Option<String>,
    pub begin_year: Option<i32>,
    pub begin_period: String,
    pub end_year: Option<i32>,
    pub end_period: String,
}

impl SeriesMetadata {
    pub fn is_seasonally_adjusted(&self) -> bool {
        self.seasonal == "S"
    }
}

/// Metadata joined onto each observation (one row per month)
#[derive(Debug, Clone, Serialize)]
pub struct JoinedObservation {
    pub series_id: String,
    pub series_title: String,
    pub seasonal: String,
    pub year: i32,
    pub period: String,
    pub value: f64,
}

// ============================================================================
// IMPORT RUN (audit trail)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub run_id: String,
    pub source: String,
    pub payload_sha256: String,
    pub rows_read: i64,
    pub rows_inserted: i64,
    pub rows_skipped: i64,
    pub imported_at: DateTime<Utc>,
}

impl ImportRun {
    pub fn new(source: &str, payload: &[u8]) -> Self {
        ImportRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            payload_sha256: payload_checksum(payload),
            rows_read: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            imported_at: Utc::now(),
        }
    }
}

/// SHA-256 of a downloaded/read payload, hex encoded
pub fn payload_checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Counts returned by the bulk inserts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertStats {
    pub inserted: usize,
    pub duplicates: usize,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode: readers see a consistent snapshot while an import runs
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS metadata (
            series_id TEXT PRIMARY KEY NOT NULL,
            group_code TEXT NOT NULL,
            item_code TEXT NOT NULL,
            seasonal TEXT NOT NULL,
            base_date TEXT NOT NULL,
            series_title TEXT NOT NULL,
            footnote_codes TEXT,
            begin_year INTEGER,
            begin_period TEXT NOT NULL,
            end_year INTEGER,
            end_period TEXT NOT NULL
        )",
        [],
    )?;

    // One observation per (series_id, year, period)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS commodities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            series_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            period TEXT NOT NULL,
            value REAL NOT NULL,
            footnote_codes TEXT,
            UNIQUE(series_id, year, period)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL,
            payload_sha256 TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            rows_inserted INTEGER NOT NULL,
            rows_skipped INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_commodities_series ON commodities(series_id, year, period)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_metadata_group ON metadata(group_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_runs_checksum ON import_runs(payload_sha256)",
        [],
    )?;

    Ok(())
}

/// Drop metadata + observations and recreate empty tables (full replace).
/// The import audit trail is kept.
pub fn reset_database(conn: &Connection) -> Result<()> {
    conn.execute("DROP TABLE IF EXISTS metadata", [])?;
    conn.execute("DROP TABLE IF EXISTS commodities", [])?;
    setup_database(conn)?;
    info!("metadata and commodities tables reset");
    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

pub fn insert_metadata(conn: &Connection, rows: &[SeriesMetadata]) -> Result<InsertStats> {
    let mut stats = InsertStats::default();
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO metadata (
                series_id, group_code, item_code, seasonal, base_date, series_title,
                footnote_codes, begin_year, begin_period, end_year, end_period
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;

        for m in rows {
            let result = stmt.execute(params![
                m.series_id,
                m.group_code,
                m.item_code,
                m.seasonal,
                m.base_date,
                m.series_title,
                m.footnote_codes,
                m.begin_year,
                m.begin_period,
                m.end_year,
                m.end_period,
            ]);

            match result {
                Ok(_) => stats.inserted += 1,
                Err(e) if is_duplicate_key(&e) => stats.duplicates += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    tx.commit()?;
    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        "metadata rows stored"
    );

    Ok(stats)
}

/// Only key collisions count as duplicates; NOT NULL and other constraint
/// failures are real errors.
fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Insert observations. Rows already present for (series_id, year, period)
/// are skipped: stored values are final once ingested.
pub fn insert_observations(conn: &Connection, rows: &[Observation]) -> Result<InsertStats> {
    let mut stats = InsertStats::default();
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO commodities (series_id, year, period, value, footnote_codes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for obs in rows {
            let result = stmt.execute(params![
                obs.series_id,
                obs.year,
                obs.period.code(),
                obs.value,
                obs.footnote_codes,
            ]);

            match result {
                Ok(_) => stats.inserted += 1,
                Err(e) if is_duplicate_key(&e) => stats.duplicates += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    tx.commit()?;
    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        "observations stored"
    );

    Ok(stats)
}

pub fn insert_import_run(conn: &Connection, run: &ImportRun) -> Result<()> {
    conn.execute(
        "INSERT INTO import_runs (
            run_id, source, payload_sha256, rows_read, rows_inserted, rows_skipped, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.run_id,
            run.source,
            run.payload_sha256,
            run.rows_read,
            run.rows_inserted,
            run.rows_skipped,
            run.imported_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

pub fn series_exists(conn: &Connection, series_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM metadata WHERE series_id = ?1)
             OR EXISTS(SELECT 1 FROM commodities WHERE series_id = ?1)",
        [series_id],
        |row| row.get(0),
    )?;

    Ok(exists)
}

/// Full series, ascending by (year, period)
pub fn get_series_data(conn: &Connection, series_id: &str) -> Result<Vec<Observation>> {
    get_series_data_range(conn, series_id, None, None)
}

/// Series filtered to an inclusive month range. Either bound may be open.
///
/// A range-filtered read carries no history before `start`; callers that need
/// lookback near the range start must read the full series instead.
pub fn get_series_data_range(
    conn: &Connection,
    series_id: &str,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<Vec<Observation>> {
    if !series_exists(conn, series_id)? {
        return Err(PpiError::SeriesNotFound(series_id.to_string()));
    }

    debug!(series_id, ?start, ?end, "reading series");

    let mut stmt = conn.prepare(
        "SELECT series_id, year, period, value, footnote_codes
         FROM commodities
         WHERE series_id = ?1
           AND (?2 IS NULL OR year * 12 + CAST(substr(period, 2) AS INTEGER) >= ?2)
           AND (?3 IS NULL OR year * 12 + CAST(substr(period, 2) AS INTEGER) <= ?3)
         ORDER BY year, period",
    )?;

    let start_index = start.map(|ym| ym.linear_index());
    let end_index = end.map(|ym| ym.linear_index());

    let rows = stmt
        .query_map(params![series_id, start_index, end_index], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(series_id, year, period, value, footnote_codes)| {
            Ok(Observation {
                series_id,
                year,
                period: period.parse()?,
                value,
                footnote_codes,
            })
        })
        .collect()
}

pub fn get_series_metadata(conn: &Connection, series_id: &str) -> Result<SeriesMetadata> {
    conn.query_row(
        "SELECT series_id, group_code, item_code, seasonal, base_date, series_title,
                footnote_codes, begin_year, begin_period, end_year, end_period
         FROM metadata
         WHERE series_id = ?1",
        [series_id],
        map_metadata_row,
    )
    .optional()?
    .ok_or_else(|| PpiError::SeriesNotFound(series_id.to_string()))
}

/// (series_id, series_title) for every known series
pub fn get_all_series_titles(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT series_id, series_title FROM metadata ORDER BY series_id")?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Keyword search over titles (case-insensitive substring)
pub fn find_series_by_keyword(conn: &Connection, keyword: &str) -> Result<Vec<SeriesMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT series_id, group_code, item_code, seasonal, base_date, series_title,
                footnote_codes, begin_year, begin_period, end_year, end_period
         FROM metadata
         WHERE series_title LIKE '%' || ?1 || '%' COLLATE NOCASE
         ORDER BY series_id",
    )?;

    let rows = stmt
        .query_map([keyword.trim()], map_metadata_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Series in a commodity group (category)
pub fn find_series_by_group(conn: &Connection, group_code: &str) -> Result<Vec<SeriesMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT series_id, group_code, item_code, seasonal, base_date, series_title,
                footnote_codes, begin_year, begin_period, end_year, end_period
         FROM metadata
         WHERE group_code = ?1
         ORDER BY item_code",
    )?;

    let rows = stmt
        .query_map([group_code.trim()], map_metadata_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Category statistics
#[derive(Debug, Clone, Serialize)]
pub struct GroupStat {
    pub group_code: String,
    pub series_count: i64,
    /// Title of the group-level series (empty item code), when present
    pub group_title: Option<String>,
}

pub fn get_group_stats(conn: &Connection) -> Result<Vec<GroupStat>> {
    let mut stmt = conn.prepare(
        "SELECT group_code,
                COUNT(*) AS series_count,
                MAX(CASE WHEN item_code = '' THEN series_title END) AS group_title
         FROM metadata
         GROUP BY group_code
         ORDER BY group_code",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(GroupStat {
                group_code: row.get(0)?,
                series_count: row.get(1)?,
                group_title: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(stats)
}

/// Metadata + observations for one series, in time order
pub fn get_joined_data(conn: &Connection, series_id: &str) -> Result<Vec<JoinedObservation>> {
    let mut stmt = conn.prepare(
        "SELECT m.series_id, m.series_title, m.seasonal, c.year, c.period, c.value
         FROM metadata m
         JOIN commodities c ON m.series_id = c.series_id
         WHERE m.series_id = ?1
         ORDER BY c.year, c.period",
    )?;

    let rows = stmt
        .query_map([series_id], |row| {
            Ok(JoinedObservation {
                series_id: row.get(0)?,
                series_title: row.get(1)?,
                seasonal: row.get(2)?,
                year: row.get(3)?,
                period: row.get(4)?,
                value: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Most recent (year, period) across all stored observations
pub fn get_latest_data_date(conn: &Connection) -> Result<Option<YearMonth>> {
    let latest: Option<(i32, String)> = conn
        .query_row(
            "SELECT year, period FROM commodities ORDER BY year DESC, period DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match latest {
        Some((year, period)) => Ok(Some(YearMonth::from_period(year, period.parse()?)?)),
        None => Ok(None),
    }
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM commodities", [], |row| row.get(0))?;

    Ok(count)
}

pub fn count_metadata(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;

    Ok(count)
}

/// Latest import of a payload with this checksum, if any
pub fn find_import_by_checksum(conn: &Connection, sha256: &str) -> Result<Option<ImportRun>> {
    let mut runs = query_import_runs(
        conn,
        "SELECT run_id, source, payload_sha256, rows_read, rows_inserted, rows_skipped, imported_at
         FROM import_runs
         WHERE payload_sha256 = ?1
         ORDER BY id DESC
         LIMIT 1",
        params![sha256],
    )?;

    Ok(runs.pop())
}

/// Import history, newest first
pub fn get_import_runs(conn: &Connection) -> Result<Vec<ImportRun>> {
    query_import_runs(
        conn,
        "SELECT run_id, source, payload_sha256, rows_read, rows_inserted, rows_skipped, imported_at
         FROM import_runs
         ORDER BY id DESC",
        params![],
    )
}

fn query_import_runs(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ImportRun>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(run_id, source, payload_sha256, rows_read, rows_inserted, rows_skipped, at)| {
            let imported_at = DateTime::parse_from_rfc3339(&at)
                .map_err(|e| PpiError::Parse(format!("bad import timestamp '{}': {}", at, e)))?
                .with_timezone(&Utc);

            Ok(ImportRun {
                run_id,
                source,
                payload_sha256,
                rows_read,
                rows_inserted,
                rows_skipped,
                imported_at,
            })
        })
        .collect()
}

fn map_metadata_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeriesMetadata> {
    Ok(SeriesMetadata {
        series_id: row.get(0)?,
        group_code: row.get(1)?,
        item_code: row.get(2)?,
        seasonal: row.get(3)?,
        base_date: row.get(4)?,
        series_title: row.get(5)?,
        footnote_codes: row.get(6)?,
        begin_year: row.get(7)?,
        begin_period: row.get(8)?,
        end_year: row.get(9)?,
        end_period: row.get(10)?,
    })
}

// ============================================================================
// SQLITE STORE (SeriesProvider adapter)
// ============================================================================

/// Owns one SQLite connection. The database path is always explicit.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "opened series store");
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SeriesProvider for SqliteStore {
    fn get_series_data(&self, series_id: &str) -> Result<Vec<Observation>> {
        get_series_data(&self.conn, series_id)
    }

    fn get_series_metadata(&self, series_id: &str) -> Result<SeriesMetadata> {
        get_series_metadata(&self.conn, series_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
