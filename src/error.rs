// ⚠️ Error taxonomy
// Caller contract violations, collaborator failures. Missing data is never an error:
// it shows up as `None` inside ChangeRecords.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PpiError {
    // ========================================================================
    // CALLER CONTRACT VIOLATIONS (fail loudly, never coerced)
    // ========================================================================
    /// Month outside 1..=12 or a period code other than M01..M12
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Lookback window of zero months (or no windows at all)
    #[error("Invalid lookback window: {0}")]
    InvalidWindow(String),

    /// End date precedes start date
    #[error("Invalid range: end {end} precedes start {start}")]
    InvalidRange { start: String, end: String },

    // ========================================================================
    // COLLABORATOR FAILURES (propagated unchanged)
    // ========================================================================
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "download")]
    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),
}

impl PpiError {
    /// True for errors caused by the caller's arguments rather than data or I/O
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PpiError::InvalidPeriod(_) | PpiError::InvalidWindow(_) | PpiError::InvalidRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PpiError>;
