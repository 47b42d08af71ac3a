// 📥 Ingestion pipeline: payload -> parse -> store -> audit row
//
// A payload whose SHA-256 was already imported is skipped unless forced, so
// re-running an import against an unchanged BLS file is a no-op.

use crate::db::{
    find_import_by_checksum, insert_import_run, insert_metadata, insert_observations, ImportRun,
};
use crate::error::Result;
use crate::parser::{parse_data_file, parse_series_file, FlatFileKind};
use rusqlite::Connection;
use tracing::info;

#[derive(Debug, Clone)]
pub enum ImportOutcome {
    Imported(ImportRun),
    /// Same payload was imported before; carries that earlier run
    Unchanged(ImportRun),
}

impl ImportOutcome {
    pub fn run(&self) -> &ImportRun {
        match self {
            ImportOutcome::Imported(run) | ImportOutcome::Unchanged(run) => run,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, ImportOutcome::Unchanged(_))
    }
}

/// Parse and store one BLS flat file
pub fn import_payload(
    conn: &Connection,
    kind: FlatFileKind,
    source: &str,
    bytes: &[u8],
    force: bool,
) -> Result<ImportOutcome> {
    let mut run = ImportRun::new(source, bytes);

    if !force {
        if let Some(previous) = find_import_by_checksum(conn, &run.payload_sha256)? {
            info!(source, run_id = %previous.run_id, "payload unchanged since last import");
            return Ok(ImportOutcome::Unchanged(previous));
        }
    }

    let (rows_read, parse_skipped, stats) = match kind {
        FlatFileKind::Series => {
            let report = parse_series_file(bytes)?;
            let stats = insert_metadata(conn, &report.records)?;
            (report.rows_read, report.skipped.len(), stats)
        }
        FlatFileKind::Data => {
            let report = parse_data_file(bytes)?;
            let stats = insert_observations(conn, &report.records)?;
            (report.rows_read, report.skipped.len(), stats)
        }
    };

    run.rows_read = rows_read as i64;
    run.rows_inserted = stats.inserted as i64;
    run.rows_skipped = (parse_skipped + stats.duplicates) as i64;
    insert_import_run(conn, &run)?;

    info!(
        source,
        kind = kind.name(),
        rows_read = run.rows_read,
        inserted = run.rows_inserted,
        skipped = run.rows_skipped,
        "import complete"
    );

    Ok(ImportOutcome::Imported(run))
}
