//! Load statistics

use crate::transform::{push_bounded, AnimeSnapshot, RecordError};
use serde::{Deserialize, Serialize};

/// Outcome counts for one `load` call, aggregated over its batches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub total: u64,
    pub inserted: u64,
    pub updated: u64,
    /// Existing rows left untouched because upsert was off
    pub skipped: u64,
    pub errors: u64,
    pub error_details: Vec<RecordError>,
}

impl LoadStats {
    /// Rows written, new or refreshed
    pub fn succeeded(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: LoadStats) {
        self.total += other.total;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
        for detail in other.error_details {
            push_bounded(&mut self.error_details, detail);
        }
    }

    pub(crate) fn record_error(&mut self, snapshot: &AnimeSnapshot, error: impl ToString) {
        self.errors += 1;
        push_bounded(
            &mut self.error_details,
            RecordError::new(snapshot.source_id, snapshot.title.as_str(), error),
        );
    }

    /// Discard the batch's outcomes and count every record in it as failed
    pub(crate) fn fail_batch(&mut self, batch: &[AnimeSnapshot], error: impl ToString) {
        let error = error.to_string();
        self.inserted = 0;
        self.updated = 0;
        self.skipped = 0;
        self.errors = 0;
        self.error_details.clear();
        for snapshot in batch {
            self.record_error(snapshot, &error);
        }
    }
}
