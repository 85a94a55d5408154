//! Persistent download history backed by SQLite.
//!
//! This is the durable memory across runs: one row per media URL path,
//! holding the filename it was saved under and whether the download
//! finished. Interrupted and repeated runs consult it so files are never
//! fetched twice.
//!
//! The store keys on the URL *path* only. CDN hostnames rotate between
//! runs while paths stay stable, so the path is the identity that
//! survives.

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
/// Connections will wait this long before returning SQLITE_BUSY.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// History-related errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Failed to connect to or query the database.
    #[error("history database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run history migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Download history store with connection pool.
///
/// With `ignore_history` set, completion checks always report "not yet
/// downloaded" while writes still go through, so the history stays
/// accurate for later runs that do respect it.
#[derive(Debug, Clone)]
pub struct History {
    pool: SqlitePool,
    ignore_history: bool,
}

impl History {
    /// Opens (creating if needed) the history database at `path`.
    ///
    /// Enables WAL mode for concurrent reads and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the connection fails,
    /// or `HistoryError::Migration` if migrations fail.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path, ignore_history: bool) -> Result<Self, HistoryError> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        // Enable WAL mode for concurrent reads
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Set busy timeout to avoid immediate lock errors
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            ignore_history,
        })
    }

    /// Creates an in-memory history for testing.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the connection fails,
    /// or `HistoryError::Migration` if migrations fail.
    pub async fn in_memory() -> Result<Self, HistoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            ignore_history: false,
        })
    }

    /// True iff a row for `url_path` exists with `completed = 1`.
    ///
    /// Always false when `ignore_history` is set.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the query fails.
    pub async fn check_completed(&self, url_path: &str) -> Result<bool, HistoryError> {
        if self.ignore_history {
            return Ok(false);
        }
        let completed: Option<i64> =
            sqlx::query_scalar("SELECT completed FROM downloads WHERE url_path = ?")
                .bind(url_path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(completed == Some(1))
    }

    /// Returns the filename previously claimed for `url_path`, if any.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the query fails.
    pub async fn get_filename(&self, url_path: &str) -> Result<Option<String>, HistoryError> {
        let filename = sqlx::query_scalar("SELECT filename FROM downloads WHERE url_path = ?")
            .bind(url_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(filename)
    }

    /// True iff any row has claimed `filename` (under any URL path).
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the query fails.
    pub async fn check_filename(&self, filename: &str) -> Result<bool, HistoryError> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM downloads WHERE filename = ?)")
                .bind(filename)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists == 1)
    }

    /// Inserts a row for `url_path` unless one already exists.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the insert fails.
    pub async fn insert_if_absent(
        &self,
        url_path: &str,
        filename: &str,
        completed: bool,
    ) -> Result<(), HistoryError> {
        sqlx::query(
            "INSERT OR IGNORE INTO downloads (url_path, filename, completed) VALUES (?, ?, ?)",
        )
        .bind(url_path)
        .bind(filename)
        .bind(i64::from(completed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or overwrites the row for `url_path`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Database` if the write fails.
    pub async fn upsert(
        &self,
        url_path: &str,
        filename: &str,
        completed: bool,
    ) -> Result<(), HistoryError> {
        sqlx::query(
            "INSERT INTO downloads (url_path, filename, completed) VALUES (?, ?, ?) \
             ON CONFLICT(url_path) DO UPDATE SET filename = excluded.filename, \
             completed = excluded.completed",
        )
        .bind(url_path)
        .bind(filename)
        .bind(i64::from(completed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Gracefully closes all connections in the pool.
    ///
    /// Call before process exit so WAL checkpointing completes.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
