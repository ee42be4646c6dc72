//! SQLite-backed page store.

mod pages;
mod util;

pub use util::map_sqlx_error;

use std::path::Path;
use std::time::Duration;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

const MAX_CONNECTIONS: u32 = 4;

/// Durable [`PageCache`](crate::cache::PageCache) implementation.
///
/// Rows live in a single `pages` table keyed by URL; the index page uses the
/// reserved `/` key.
#[derive(Clone)]
pub struct SqlitePageCache {
    pool: SqlitePool,
}

impl SqlitePageCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open (creating if needed) the database file at `path` and apply migrations.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A private in-memory database; used by tests and throwaway runs.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` is its own database, so pin the pool
        // to one connection that never expires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
