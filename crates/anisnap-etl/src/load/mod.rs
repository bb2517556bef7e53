//! Snapshot persistence
//!
//! The [`SnapshotLoader`] splits its input into fixed-size batches and
//! writes each batch through one [`StoreSession`]. Record-level failures are
//! counted and skipped; a failed commit counts the whole batch as failed.
//! Rows are keyed on the natural key `(source_id, snapshot_type,
//! snapshot_date)`, so re-loading the same snapshots with upsert enabled
//! refreshes rows instead of duplicating them.

pub mod memory;
pub mod postgres;
pub mod stats;

pub use memory::MemorySnapshotStore;
pub use postgres::{create_pool, PgSnapshotStore};
pub use stats::LoadStats;

use crate::error::StoreResult;
use crate::transform::AnimeSnapshot;
use anisnap_common::NaturalKey;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Backing store for snapshot rows
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Open a transactional session for one batch
    async fn begin(&self) -> StoreResult<Box<dyn StoreSession>>;

    async fn ping(&self) -> StoreResult<()>;

    /// Most recent `snapshot_date` stored for a snapshot type
    async fn latest_snapshot_date(&self, snapshot_type: &str) -> StoreResult<Option<NaiveDate>>;

    /// Delete rows of `snapshot_type` dated before `cutoff`; returns rows removed
    async fn purge_older_than(&self, snapshot_type: &str, cutoff: NaiveDate) -> StoreResult<u64>;
}

/// Unit of work over one batch.
///
/// A failing write must leave the session usable for the remaining records.
/// Nothing written through the session is visible to others before
/// `commit`, and a failed commit persists nothing.
#[async_trait]
pub trait StoreSession: Send {
    async fn exists(&mut self, key: &NaturalKey) -> StoreResult<bool>;

    /// Plain insert; fails if the natural key is taken
    async fn insert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()>;

    /// Insert, or on conflict refresh only `title`, `score`, `rank`,
    /// `popularity`, `members`, `favorites` and `updated_at`
    async fn upsert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Batched, idempotent writer of snapshots
pub struct SnapshotLoader<S: ?Sized> {
    store: Arc<S>,
}

impl<S: SnapshotStore + ?Sized> SnapshotLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Load snapshots in batches of `batch_size` (clamped to at least 1)
    pub async fn load(&self, snapshots: &[AnimeSnapshot], batch_size: usize, upsert: bool) -> LoadStats {
        let batch_size = batch_size.max(1);
        let mut stats = LoadStats::default();

        info!(
            total_snapshots = snapshots.len(),
            batch_size,
            upsert,
            "Starting snapshot load"
        );

        for (batch_no, batch) in snapshots.chunks(batch_size).enumerate() {
            let batch_stats = self.load_batch(batch, upsert).await;
            debug!(
                batch = batch_no + 1,
                size = batch.len(),
                inserted = batch_stats.inserted,
                updated = batch_stats.updated,
                skipped = batch_stats.skipped,
                errors = batch_stats.errors,
                "Batch processed"
            );
            stats.merge(batch_stats);
        }

        info!(
            total = stats.total,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            errors = stats.errors,
            "Snapshot load completed"
        );

        stats
    }

    async fn load_batch(&self, batch: &[AnimeSnapshot], upsert: bool) -> LoadStats {
        let mut stats = LoadStats {
            total: batch.len() as u64,
            ..LoadStats::default()
        };

        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to open store session");
                stats.fail_batch(batch, &e);
                return stats;
            },
        };

        for snapshot in batch {
            match write_one(session.as_mut(), snapshot, upsert).await {
                Ok(WriteOutcome::Inserted) => stats.inserted += 1,
                Ok(WriteOutcome::Updated) => stats.updated += 1,
                Ok(WriteOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        mal_id = snapshot.source_id,
                        title = %snapshot.title,
                        error = %e,
                        "Failed to write snapshot"
                    );
                    stats.record_error(snapshot, &e);
                },
            }
        }

        if stats.succeeded() == 0 {
            // Nothing to keep
            if let Err(e) = session.rollback().await {
                warn!(error = %e, "Rollback of empty batch failed");
            }
            return stats;
        }

        if let Err(e) = session.commit().await {
            error!(error = %e, batch_size = batch.len(), "Batch commit failed, batch rolled back");
            stats.fail_batch(batch, &e);
        }

        stats
    }

    /// Newest stored snapshot date for a type
    pub async fn latest_snapshot_date(&self, snapshot_type: &str) -> StoreResult<Option<NaiveDate>> {
        self.store.latest_snapshot_date(snapshot_type).await
    }

    /// Remove snapshots of one type older than `keep_days` before `today`
    pub async fn cleanup_old_snapshots(
        &self,
        snapshot_type: &str,
        keep_days: u32,
        today: NaiveDate,
    ) -> StoreResult<u64> {
        let cutoff = today
            .checked_sub_days(chrono::Days::new(u64::from(keep_days)))
            .unwrap_or(NaiveDate::MIN);
        let removed = self.store.purge_older_than(snapshot_type, cutoff).await?;
        info!(snapshot_type, %cutoff, removed, "Old snapshots removed");
        Ok(removed)
    }
}

async fn write_one(
    session: &mut dyn StoreSession,
    snapshot: &AnimeSnapshot,
    upsert: bool,
) -> StoreResult<WriteOutcome> {
    let existed = session.exists(&snapshot.key()).await?;

    match (upsert, existed) {
        (false, true) => Ok(WriteOutcome::Skipped),
        (false, false) => {
            session.insert(snapshot).await?;
            Ok(WriteOutcome::Inserted)
        },
        (true, _) => {
            session.upsert(snapshot).await?;
            Ok(if existed {
                WriteOutcome::Updated
            } else {
                WriteOutcome::Inserted
            })
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extract::models::JikanAnime;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn snapshot(id: i64, score: f64) -> AnimeSnapshot {
        let mut anime = JikanAnime::new(id, format!("Anime {}", id));
        anime.score = Some(score);
        AnimeSnapshot::from_raw(&anime, "top", date()).unwrap()
    }

    fn loader() -> (Arc<MemorySnapshotStore>, SnapshotLoader<MemorySnapshotStore>) {
        let store = Arc::new(MemorySnapshotStore::new());
        (store.clone(), SnapshotLoader::new(store))
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let (store, loader) = loader();
        let batch = vec![snapshot(1, 8.75), snapshot(5, 8.12)];

        let first = loader.load(&batch, 100, true).await;
        assert_eq!((first.inserted, first.updated, first.errors), (2, 0, 0));

        let second = loader.load(&batch, 100, true).await;
        assert_eq!((second.inserted, second.updated, second.errors), (0, 2, 0));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_mutable_fields_only() {
        let (store, loader) = loader();
        let mut original = snapshot(1, 8.75);
        original.synopsis = Some("First synopsis".to_string());
        loader.load(std::slice::from_ref(&original), 100, true).await;

        let mut changed = original.clone();
        changed.score = Some(8.80);
        changed.rank = Some(3);
        changed.synopsis = Some("Second synopsis".to_string());
        let stats = loader.load(&[changed], 100, true).await;
        assert_eq!(stats.updated, 1);

        let stored = store.get(&original.key()).unwrap();
        assert_eq!(stored.snapshot.score, Some(8.80));
        assert_eq!(stored.snapshot.rank, Some(3));
        assert_eq!(stored.snapshot.synopsis.as_deref(), Some("First synopsis"));
    }

    #[tokio::test]
    async fn test_existing_rows_skipped_without_upsert() {
        let (store, loader) = loader();
        loader.load(&[snapshot(1, 8.0)], 100, true).await;

        let stats = loader.load(&[snapshot(1, 9.0), snapshot(2, 7.0)], 100, false).await;
        assert_eq!((stats.inserted, stats.skipped, stats.updated), (1, 1, 0));
        assert_eq!(store.get(&snapshot(1, 0.0).key()).unwrap().snapshot.score, Some(8.0));
    }

    #[tokio::test]
    async fn test_record_failure_isolated_within_batch() {
        let (store, loader) = loader();
        store.fail_writes_for(3);
        let batch: Vec<AnimeSnapshot> = (1..=5).map(|id| snapshot(id, 7.0)).collect();

        let stats = loader.load(&batch, 100, true).await;

        assert_eq!(stats.inserted, 4);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.error_details[0].source_id, 3);
        for id in [1, 2, 4, 5] {
            assert!(store.get(&snapshot(id, 0.0).key()).is_some());
        }
        assert!(store.get(&snapshot(3, 0.0).key()).is_none());
    }

    #[tokio::test]
    async fn test_commit_failure_fails_only_that_batch() {
        let (store, loader) = loader();
        store.fail_next_commit();
        let batch: Vec<AnimeSnapshot> = (1..=5).map(|id| snapshot(id, 7.0)).collect();

        let stats = loader.load(&batch, 2, true).await;

        // First batch (ids 1-2) lost to the commit failure
        assert_eq!(stats.total, 5);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.inserted, 3);
        assert_eq!(store.len(), 3);
        assert!(store.get(&snapshot(1, 0.0).key()).is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_counts_errors() {
        let (store, loader) = loader();
        store.set_available(false);

        let stats = loader.load(&[snapshot(1, 7.0), snapshot(2, 7.0)], 100, true).await;
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_old_snapshots() {
        let (store, loader) = loader();
        let mut old = snapshot(1, 7.0);
        old.snapshot_date = NaiveDate::from_ymd_opt(2023, 11, 1).unwrap();
        loader.load(&[old, snapshot(1, 7.0)], 100, true).await;

        let removed = loader.cleanup_old_snapshots("top", 30, date()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(loader.latest_snapshot_date("top").await.unwrap(), Some(date()));
    }
}
