//! SQLite-backed seen-set store.
//!
//! One local file holds the identifier-to-first-seen mapping that makes
//! "notify exactly once" survive restarts. Timestamps are stored as unix
//! seconds so the prune comparison is exact.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use firstin_core::{PollError, SeenStore};

/// Durable seen-set on a single SQLite file.
///
/// Cloning shares the underlying pool, so every poller writes through the
/// same serialized connection set.
#[derive(Clone)]
pub struct SqliteSeenStore {
    pool: SqlitePool,
}

impl SqliteSeenStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PollError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Ephemeral in-memory store for tests. A single connection keeps every
    /// query on the same in-memory database.
    pub async fn in_memory() -> Result<Self, PollError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), PollError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_jobs (
                job_id     TEXT PRIMARY KEY,
                first_seen INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// Close the underlying pool. Pending writes are flushed first.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn store_err(e: sqlx::Error) -> PollError {
    PollError::Store(e.to_string())
}

impl SeenStore for SqliteSeenStore {
    async fn has_seen(&self, job_id: &str) -> Result<bool, PollError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM seen_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.is_some())
    }

    async fn mark_seen(&self, job_id: &str) -> Result<(), PollError> {
        // Re-marking an existing id keeps its original first_seen.
        sqlx::query("INSERT OR IGNORE INTO seen_jobs (job_id, first_seen) VALUES (?, ?)")
            .bind(job_id)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn prune(&self, older_than: Duration) -> Result<u64, PollError> {
        let cutoff = Utc::now().timestamp() - older_than.as_secs() as i64;
        let result = sqlx::query("DELETE FROM seen_jobs WHERE first_seen < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn is_empty(&self) -> Result<bool, PollError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count == 0)
    }
}
