// PostgreSQL snapshot storage

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::load::{SnapshotStore, StoreSession};
use crate::transform::AnimeSnapshot;
use anisnap_common::NaturalKey;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Connection, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, warn};

const INSERT_COLUMNS: &str = r#"
    source_id, url, title, title_english, title_japanese, title_synonyms, titles,
    type, source, episodes, status, airing, duration, rating,
    score, scored_by, rank, popularity, members, favorites, approved,
    season, year, aired, synopsis, background, images, trailer, broadcast,
    genres, explicit_genres, themes, demographics, studios, producers, licensors,
    snapshot_type, snapshot_date
"#;

const INSERT_VALUES: &str = r#"
    $1, $2, $3, $4, $5, $6, $7,
    $8, $9, $10, $11, $12, $13, $14,
    $15, $16, $17, $18, $19, $20, $21,
    $22, $23, $24, $25, $26, $27, $28, $29,
    $30, $31, $32, $33, $34, $35, $36,
    $37, $38
"#;

/// Create a connection pool from database settings
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Snapshot store backed by the `anime_snapshots` table
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreSession>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn latest_snapshot_date(&self, snapshot_type: &str) -> StoreResult<Option<NaiveDate>> {
        let latest = sqlx::query_scalar::<_, Option<NaiveDate>>(
            "SELECT MAX(snapshot_date) FROM anime_snapshots WHERE snapshot_type = $1",
        )
        .bind(snapshot_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn purge_older_than(&self, snapshot_type: &str, cutoff: NaiveDate) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM anime_snapshots WHERE snapshot_type = $1 AND snapshot_date < $2",
        )
        .bind(snapshot_type)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// One transaction per batch; every statement runs in its own savepoint so
/// a failing record does not abort the enclosing transaction
struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    async fn execute_in_savepoint(&mut self, query: Query<'_, Postgres, PgArguments>) -> StoreResult<u64> {
        let mut savepoint = Connection::begin(&mut *self.tx).await?;
        let result = query.execute(&mut *savepoint).await;
        finish_savepoint(savepoint, result.map(|r| r.rows_affected())).await
    }
}

async fn finish_savepoint<T>(
    savepoint: Transaction<'_, Postgres>,
    result: Result<T, sqlx::Error>,
) -> StoreResult<T> {
    match result {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(value)
        },
        Err(e) => {
            if let Err(rollback_err) = savepoint.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back savepoint");
            }
            Err(StoreError::Database(e))
        },
    }
}

fn bind_snapshot<'q>(
    query: Query<'q, Postgres, PgArguments>,
    s: &'q AnimeSnapshot,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(s.source_id)
        .bind(s.url.as_deref())
        .bind(s.title.as_str())
        .bind(s.title_english.as_deref())
        .bind(s.title_japanese.as_deref())
        .bind(s.title_synonyms.as_ref().map(Json))
        .bind(s.titles.as_ref().map(Json))
        .bind(s.kind.as_deref())
        .bind(s.source.as_deref())
        .bind(s.episodes)
        .bind(s.status.as_deref())
        .bind(s.airing)
        .bind(s.duration.as_deref())
        .bind(s.rating.as_deref())
        .bind(s.score)
        .bind(s.scored_by)
        .bind(s.rank)
        .bind(s.popularity)
        .bind(s.members)
        .bind(s.favorites)
        .bind(s.approved)
        .bind(s.season.as_deref())
        .bind(s.year)
        .bind(s.aired.as_ref().map(Json))
        .bind(s.synopsis.as_deref())
        .bind(s.background.as_deref())
        .bind(s.images.as_ref().map(Json))
        .bind(s.trailer.as_ref().map(Json))
        .bind(s.broadcast.as_ref().map(Json))
        .bind(s.genres.as_ref().map(Json))
        .bind(s.explicit_genres.as_ref().map(Json))
        .bind(s.themes.as_ref().map(Json))
        .bind(s.demographics.as_ref().map(Json))
        .bind(s.studios.as_ref().map(Json))
        .bind(s.producers.as_ref().map(Json))
        .bind(s.licensors.as_ref().map(Json))
        .bind(s.snapshot_type.as_str())
        .bind(s.snapshot_date)
}

#[async_trait]
impl StoreSession for PgSession {
    async fn exists(&mut self, key: &NaturalKey) -> StoreResult<bool> {
        let mut savepoint = Connection::begin(&mut *self.tx).await?;
        let found = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM anime_snapshots
                WHERE source_id = $1 AND snapshot_type = $2 AND snapshot_date = $3
            )
            "#,
        )
        .bind(key.source_id)
        .bind(key.snapshot_type.as_str())
        .bind(key.snapshot_date)
        .fetch_one(&mut *savepoint)
        .await;

        finish_savepoint(savepoint, found).await
    }

    async fn insert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()> {
        let sql = format!("INSERT INTO anime_snapshots ({INSERT_COLUMNS}) VALUES ({INSERT_VALUES})");
        self.execute_in_savepoint(bind_snapshot(sqlx::query(&sql), snapshot))
            .await?;
        Ok(())
    }

    async fn upsert(&mut self, snapshot: &AnimeSnapshot) -> StoreResult<()> {
        let sql = format!(
            r#"
            INSERT INTO anime_snapshots ({INSERT_COLUMNS}) VALUES ({INSERT_VALUES})
            ON CONFLICT (source_id, snapshot_type, snapshot_date)
            DO UPDATE SET
                title = EXCLUDED.title,
                score = EXCLUDED.score,
                rank = EXCLUDED.rank,
                popularity = EXCLUDED.popularity,
                members = EXCLUDED.members,
                favorites = EXCLUDED.favorites,
                updated_at = NOW()
            "#
        );
        self.execute_in_savepoint(bind_snapshot(sqlx::query(&sql), snapshot))
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
