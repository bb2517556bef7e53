//! In-process snapshot store
//!
//! Mirrors the Postgres store's semantics (natural-key uniqueness, staged
//! writes until commit, partial refresh on upsert). Uniqueness is checked
//! again at commit, so two sessions inserting the same key cannot both
//! succeed. Backs `--dry-run` and the
//! test suite, with switches to inject write, commit and availability
//! failures.

use crate::error::{StoreError, StoreResult};
use crate::load::{SnapshotStore, StoreSession};
use crate::transform::AnimeSnapshot;
use anisnap_common::NaturalKey;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A stored row with its server-managed timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub snapshot: AnimeSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<NaturalKey, StoredSnapshot>,
    failing_source_ids: HashSet<i64>,
    fail_next_commit: bool,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    pub fn get(&self, key: &NaturalKey) -> Option<StoredSnapshot> {
        self.lock().rows.get(key).cloned()
    }

    /// All rows in natural-key order
    pub fn rows(&self) -> Vec<StoredSnapshot> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Make every write of this source id fail
    pub fn fail_writes_for(&self, source_id: i64) {
        self.lock().failing_source_ids.insert(source_id);
    }

    /// Make the next commit fail (once)
    pub fn fail_next_commit(&self) {
        self.lock().fail_next_commit = true;
    }

    /// While unavailable, `begin` and `ping` fail
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreSession>> {
        if self.lock().unavailable {
            return Err(StoreError::Injected("store unavailable".to_string()));
        }

        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            staged: BTreeMap::new(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.lock().unavailable {
            return Err(StoreError::Injected("store unavailable".to_string()));
        }
        Ok(())
    }

    async fn latest_snapshot_date(&self, snapshot_type: &str) -> StoreResult<Option<NaiveDate>> {
        Ok(self
            .lock()
            .rows
            .keys()
            .filter(|key| key.snapshot_type == snapshot_type)
            .map(|key| key.snapshot_date)
            .max())
    }

    async fn purge_older_than(&self, snapshot_type: &str, cutoff: NaiveDate) -> StoreResult<u64> {
        let mut state = self.lock();
        let before = state.rows.len();
        state
            .rows
            .retain(|key, _| key.snapshot_type != snapshot_type || key.snapshot_date >= cutoff);
        Ok((before - state.rows.len()) as u64)
    }
}

/// A staged write, replayed against the committed rows at commit time
#[derive(Debug, Clone)]
enum StagedWrite {
    Insert(StoredSnapshot),
    Upsert(StoredSnapshot),
}

impl StagedWrite {
    fn row(&self) -> &StoredSnapshot {
        match self {
            StagedWrite::Insert(row) | StagedWrite::Upsert(row) => row,
        }
    }
}

/// Copy the columns an upsert may change onto an existing row
fn refresh_mutable(existing: &mut StoredSnapshot, incoming: &AnimeSnapshot, now: DateTime<Utc>) {
    let row = &mut existing.snapshot;
    row.title = incoming.title.clone();
    row.score = incoming.score;
    row.rank = incoming.rank;
    row.popularity = incoming.popularity;
    row.members = incoming.members;
    row.favorites = incoming.favorites;
    existing.updated_at = now;
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    staged: BTreeMap<NaturalKey, StagedWrite>,
}

impl MemorySession {
    fn current(&self, key: &NaturalKey) -> Option<StoredSnapshot> {
        self.staged
            .get(key)
            .map(|write| write.row().clone())
            .or_else(|| lock_state(&self.state).rows.get(key).cloned())
    }

    fn check_injected(&self, snapshot: &AnimeSnapshot) -> StoreResult<()> {
        if lock_state(&self.state).failing_source_ids.contains(&snapshot.source_id) {
            return Err(StoreError::Injected(format!(
                "write rejected for source_id {}",
                snapshot.source_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn exists(&mut self, key: &NaturalKey) -> StoreResult<bool> {
        Ok(self.current(key).is_some())
    }

    async fn insert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()> {
        self.check_injected(snapshot)?;

        let key = snapshot.key();
        if self.current(&key).is_some() {
            return Err(StoreError::Injected(format!(
                "duplicate key value violates unique constraint: {}",
                key
            )));
        }

        let now = Utc::now();
        self.staged.insert(
            key,
            StagedWrite::Insert(StoredSnapshot {
                snapshot: snapshot.clone(),
                created_at: now,
                updated_at: now,
            }),
        );
        Ok(())
    }

    async fn upsert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()> {
        self.check_injected(snapshot)?;

        let key = snapshot.key();
        let now = Utc::now();
        let row = match self.current(&key) {
            Some(mut existing) => {
                refresh_mutable(&mut existing, snapshot, now);
                existing
            },
            None => StoredSnapshot {
                snapshot: snapshot.clone(),
                created_at: now,
                updated_at: now,
            },
        };

        // An insert staged earlier in this session stays an insert
        let write = match self.staged.get(&key) {
            Some(StagedWrite::Insert(_)) => StagedWrite::Insert(row),
            _ => StagedWrite::Upsert(row),
        };
        self.staged.insert(key, write);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemorySession { state: shared, staged } = *self;
        let mut state = lock_state(&shared);

        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(StoreError::Injected("commit failed".to_string()));
        }

        // Another session may have committed the same key since it was staged
        if let Some(key) = staged
            .iter()
            .find(|(key, write)| matches!(write, StagedWrite::Insert(_)) && state.rows.contains_key(*key))
            .map(|(key, _)| key)
        {
            return Err(StoreError::Injected(format!(
                "duplicate key value violates unique constraint: {}",
                key
            )));
        }

        for (key, write) in staged {
            match write {
                StagedWrite::Upsert(row) => match state.rows.get_mut(&key) {
                    Some(existing) => refresh_mutable(existing, &row.snapshot, row.updated_at),
                    None => {
                        state.rows.insert(key, row);
                    },
                },
                StagedWrite::Insert(row) => {
                    state.rows.insert(key, row);
                },
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extract::models::JikanAnime;

    fn snapshot(id: i64) -> AnimeSnapshot {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        AnimeSnapshot::from_raw(&JikanAnime::new(id, "Trigun"), "top", date).unwrap()
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemorySnapshotStore::new();
        let mut session = store.begin().await.unwrap();
        session.insert(&snapshot(6)).await.unwrap();

        assert!(session.exists(&snapshot(6).key()).await.unwrap());
        assert!(store.is_empty());

        session.commit().await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemorySnapshotStore::new();
        let mut session = store.begin().await.unwrap();
        session.upsert(&snapshot(6)).await.unwrap();
        session.rollback().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemorySnapshotStore::new();
        let mut session = store.begin().await.unwrap();
        session.insert(&snapshot(6)).await.unwrap();
        assert!(session.insert(&snapshot(6)).await.is_err());
        // Session stays usable after a failed write
        session.insert(&snapshot(7)).await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let store = MemorySnapshotStore::new();
        let mut session = store.begin().await.unwrap();
        session.upsert(&snapshot(6)).await.unwrap();
        session.commit().await.unwrap();
        let first = store.get(&snapshot(6).key()).unwrap();

        let mut session = store.begin().await.unwrap();
        session.upsert(&snapshot(6)).await.unwrap();
        session.commit().await.unwrap();
        let second = store.get(&snapshot(6).key()).unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_of_same_key_conflict_at_commit() {
        let store = MemorySnapshotStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut original = snapshot(6);
        original.score = Some(8.2);
        let mut rival = snapshot(6);
        rival.score = Some(5.0);

        first.insert(&original).await.unwrap();
        // Not yet visible to the other session
        second.insert(&rival).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&original.key()).unwrap().snapshot.score, Some(8.2));
    }

    #[tokio::test]
    async fn test_failed_commit_persists_nothing_from_the_session() {
        let store = MemorySnapshotStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.insert(&snapshot(6)).await.unwrap();
        second.insert(&snapshot(6)).await.unwrap();
        second.insert(&snapshot(7)).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());
        assert!(store.get(&snapshot(7).key()).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_refresh_committed_row() {
        let store = MemorySnapshotStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut original = snapshot(6);
        original.score = Some(8.2);
        original.synopsis = Some("Original synopsis.".to_string());
        let mut refreshed = snapshot(6);
        refreshed.score = Some(8.4);
        refreshed.synopsis = Some("Replacement synopsis.".to_string());

        first.upsert(&original).await.unwrap();
        second.upsert(&refreshed).await.unwrap();

        first.commit().await.unwrap();
        let committed = store.get(&original.key()).unwrap();
        second.commit().await.unwrap();

        let row = store.get(&original.key()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(row.created_at, committed.created_at);
        assert_eq!(row.snapshot.score, Some(8.4));
        // Only mutable columns are refreshed
        assert_eq!(row.snapshot.synopsis.as_deref(), Some("Original synopsis."));
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemorySnapshotStore::new();
        store.set_available(false);
        assert!(store.ping().await.is_err());
        assert!(store.begin().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
