//! Raw record to snapshot transformation
//!
//! Each record is converted independently. A record that fails validation
//! is dropped and recorded in the [`TransformSummary`]; the bulk call
//! itself never fails.

pub mod snapshot;
pub mod text;

pub use snapshot::AnimeSnapshot;
pub use text::clean_text;

use crate::error::ErrorKind;
use crate::extract::models::JikanAnime;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Upper bound on per-record error details kept for reporting
pub const MAX_RECORD_ERRORS: usize = 100;

/// Diagnostic entry for one record that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub source_id: i64,
    pub title: String,
    pub error: String,
}

impl RecordError {
    pub fn new(source_id: i64, title: impl Into<String>, error: impl ToString) -> Self {
        Self {
            source_id,
            title: title.into(),
            error: error.to_string(),
        }
    }
}

/// Append unless the list is already at [`MAX_RECORD_ERRORS`]
pub(crate) fn push_bounded(details: &mut Vec<RecordError>, detail: RecordError) {
    if details.len() < MAX_RECORD_ERRORS {
        details.push(detail);
    }
}

/// Running transformation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub total_processed: u64,
    pub successful: u64,
    /// Records rejected by a value constraint
    pub validation_errors: u64,
    /// Records dropped for any other reason
    pub dropped_invalid: u64,
    pub errors: Vec<RecordError>,
}

impl TransformSummary {
    /// Percentage of processed records that produced a snapshot
    pub fn success_rate(&self) -> f64 {
        self.successful as f64 / self.total_processed.max(1) as f64 * 100.0
    }

    /// Records were seen but none survived
    pub fn all_rejected(&self) -> bool {
        self.total_processed > 0 && self.successful == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Converts raw API records into validated snapshots
#[derive(Debug, Default)]
pub struct AnimeTransformer {
    summary: TransformSummary,
}

impl AnimeTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a page-ordered list of records; output keeps input order
    pub fn transform(
        &mut self,
        records: &[JikanAnime],
        snapshot_type: &str,
        snapshot_date: NaiveDate,
    ) -> Vec<AnimeSnapshot> {
        info!(
            total_anime = records.len(),
            snapshot_type,
            %snapshot_date,
            "Starting anime transformation"
        );

        let mut snapshots = Vec::with_capacity(records.len());

        for anime in records {
            self.summary.total_processed += 1;

            match AnimeSnapshot::from_raw(anime, snapshot_type, snapshot_date) {
                Ok(snapshot) => {
                    snapshots.push(snapshot);
                    self.summary.successful += 1;
                },
                Err(e) => {
                    if e.kind() == ErrorKind::Validation {
                        self.summary.validation_errors += 1;
                        warn!(
                            mal_id = anime.mal_id,
                            title = %anime.title,
                            error = %e,
                            "Validation error during transformation"
                        );
                    } else {
                        self.summary.dropped_invalid += 1;
                        error!(
                            mal_id = anime.mal_id,
                            title = %anime.title,
                            error = %e,
                            "Unexpected error during transformation"
                        );
                    }
                    push_bounded(
                        &mut self.summary.errors,
                        RecordError::new(anime.mal_id, anime.title.as_str(), &e),
                    );
                },
            }
        }

        info!(
            total_processed = self.summary.total_processed,
            successful = self.summary.successful,
            validation_errors = self.summary.validation_errors,
            dropped_invalid = self.summary.dropped_invalid,
            "Transformation completed"
        );

        snapshots
    }

    pub fn summary(&self) -> &TransformSummary {
        &self.summary
    }

    pub fn into_summary(self) -> TransformSummary {
        self.summary
    }

    pub fn reset(&mut self) {
        self.summary.reset();
    }
}
