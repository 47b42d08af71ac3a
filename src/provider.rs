// 🔌 Series Provider - the read capability the analytics core depends on
//
// Exactly two reads. The SQLite store implements it (db::SqliteStore); the
// in-memory adapter below serves tests and ad-hoc series built in code.

use crate::db::{Observation, SeriesMetadata};
use crate::error::{PpiError, Result};
use std::collections::HashMap;

/// Read-only access to stored series
///
/// Contract for `get_series_data`:
/// - ascending by (year, period), one observation per month
/// - `SeriesNotFound` for an unknown id, empty vec for a known id with no data
/// - the returned vec is a consistent snapshot (no torn reads during ingestion)
pub trait SeriesProvider {
    fn get_series_data(&self, series_id: &str) -> Result<Vec<Observation>>;

    fn get_series_metadata(&self, series_id: &str) -> Result<SeriesMetadata>;
}

// ============================================================================
// IN-MEMORY PROVIDER
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct InMemoryProvider {
    series: HashMap<String, Vec<Observation>>,
    metadata: HashMap<String, SeriesMetadata>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a series. Observations are kept in the order given:
    /// the caller owns the ascending-order contract.
    pub fn insert_series(&mut self, series_id: &str, observations: Vec<Observation>) {
        self.series.insert(series_id.to_string(), observations);
    }

    pub fn insert_metadata(&mut self, metadata: SeriesMetadata) {
        self.series.entry(metadata.series_id.clone()).or_default();
        self.metadata.insert(metadata.series_id.clone(), metadata);
    }
}

impl SeriesProvider for InMemoryProvider {
    fn get_series_data(&self, series_id: &str) -> Result<Vec<Observation>> {
        self.series
            .get(series_id)
            .cloned()
            .ok_or_else(|| PpiError::SeriesNotFound(series_id.to_string()))
    }

    fn get_series_metadata(&self, series_id: &str) -> Result<SeriesMetadata> {
        self.metadata
            .get(series_id)
            .cloned()
            .ok_or_else(|| PpiError::SeriesNotFound(series_id.to_string()))
    }
}
