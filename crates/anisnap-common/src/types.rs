//! Shared snapshot types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Natural key of a persisted snapshot row.
///
/// At most one row exists per `(source_id, snapshot_type, snapshot_date)`;
/// upserts resolve conflicts on exactly this triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Identifier of the catalogue item at the source (MyAnimeList id)
    pub source_id: i64,
    /// Dataset category the snapshot belongs to (e.g. "top")
    pub snapshot_type: String,
    /// Logical as-of date, not the persistence timestamp
    pub snapshot_date: NaiveDate,
}

impl NaturalKey {
    pub fn new(source_id: i64, snapshot_type: impl Into<String>, snapshot_date: NaiveDate) -> Self {
        Self {
            source_id,
            snapshot_type: snapshot_type.into(),
            snapshot_date,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.snapshot_type, self.source_id, self.snapshot_date)
    }
}

/// Flattened reference to a related entity (genre, studio, producer, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub url: String,
}
