// PPI Toolkit - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod calendar;
pub mod rolling;
pub mod changes;
pub mod levels;
pub mod provider;
pub mod db;
pub mod parser;
pub mod ingest;
pub mod search;
pub mod export;
pub mod config;
#[cfg(feature = "download")]
pub mod download;

// Re-export commonly used types
pub use error::{PpiError, Result};
pub use calendar::{months_between, to_linear_index, Period, YearMonth};
pub use rolling::annualized_change;
pub use changes::{
    build_change_series, compute_changes, default_range, latest_changes, parse_windows,
    ChangeRecord, LookbackWindow, WindowChange, DEFAULT_SPAN_MONTHS, DEFAULT_WINDOWS,
};
pub use levels::{
    align_by_date, compare_series, price_levels, rebase_to_first, LevelPoint, RebasedSeries,
};
pub use provider::{InMemoryProvider, SeriesProvider};
pub use db::{
    Observation, SeriesMetadata, JoinedObservation, ImportRun, GroupStat, SqliteStore,
    setup_database, reset_database, get_series_data, get_series_data_range,
    get_series_metadata, get_group_stats, get_latest_data_date, verify_count,
};
pub use parser::{detect_kind, parse_data_file, parse_series_file, FlatFileKind, ParseReport};
pub use ingest::{import_payload, ImportOutcome};
pub use search::{fuzzy_search, keyword_search, category_search, SearchHit, DEFAULT_SEARCH_LIMIT};
pub use export::{export_changes_csv, write_changes_csv};
pub use config::Config;
#[cfg(feature = "download")]
pub use download::{BlsDownloader, Payload};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
