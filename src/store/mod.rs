//! SQLite persistence for the three logical tables.
//!
//! | Table | Module | Shape |
//! |-------|--------|-------|
//! | `tracking` | [`tracking`] | url -> current tier |
//! | `fetch` | [`fetch_log`] | append-only log of every retrieval attempt |
//! | `snapshot` | [`snapshots`] | append-only, per-url ordered content versions |
//!
//! The table modules expose free functions over a `&mut SqliteConnection`, so
//! a caller decides the transaction scope: a pooled connection for reads, or
//! a [`sqlx::Transaction`] from [`Store::begin`] when several writes must
//! land together. Several processes may share one database file (the daemon
//! and an operator's `freeze`, for instance).

pub mod fetch_log;
mod schema;
pub mod snapshots;
pub mod tracking;

use crate::error::Result;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Handle to the monitor database, passed explicitly to every component.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Row counts across the three tables, used by the weekly report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreTotals {
    pub resources: i64,
    pub snapshots: i64,
    pub fetches: i64,
}

impl Store {
    /// Open (creating if needed) the database file and make sure every table exists.
    #[instrument(level = "info", skip_all, fields(path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new database");
        } else {
            info!("Opened existing database");
        }

        schema::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database on a single, never-recycled connection.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        schema::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// Start a write transaction; dropping it without `commit` rolls everything back.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so another
    /// writer waits on the busy timeout instead of invalidating this
    /// transaction's reads between its first read and first write.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Borrow a pooled connection for reads.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn totals(&self) -> Result<StoreTotals> {
        let mut conn = self.acquire().await?;
        let resources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracking")
            .fetch_one(&mut *conn)
            .await?;
        let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshot")
            .fetch_one(&mut *conn)
            .await?;
        let fetches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fetch")
            .fetch_one(&mut *conn)
            .await?;
        Ok(StoreTotals {
            resources,
            snapshots,
            fetches,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("monitor.sqlite3");

        let store = Store::open(&path).await.unwrap();
        assert!(path.exists());

        let totals = store.totals().await.unwrap();
        assert_eq!(
            totals,
            StoreTotals {
                resources: 0,
                snapshots: 0,
                fetches: 0
            }
        );
        store.close().await;

        // Reopening an existing file must not fail on the existing tables
        let store = Store::open(&path).await.unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = Store::open_in_memory().await.unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            tracking::insert(&mut tx, "https://a", Tier::FRESH).await.unwrap();
        }
        let mut conn = store.acquire().await.unwrap();
        assert_eq!(tracking::get(&mut conn, "https://a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_writer_waits_for_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.sqlite3");
        let store = Store::open(&path).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tracking::insert(&mut tx, "https://a", Tier::FRESH).await.unwrap();
        tracking::insert(&mut tx, "https://b", Tier::FRESH).await.unwrap();
        tx.commit().await.unwrap();

        // Read first, write later, like the tier and discovery phases
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tracking::list_all(&mut tx).await.unwrap().len(), 2);

        // Another process freezes an article in between
        let operator = Store::open(&path).await.unwrap();
        let freeze = tokio::spawn(async move {
            let mut conn = operator.acquire().await.unwrap();
            let frozen = tracking::set_tier(&mut conn, "https://b", Tier::FROZEN).await;
            drop(conn);
            operator.close().await;
            frozen
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let promoted = Tier::new(2).unwrap();
        tracking::set_tier(&mut tx, "https://a", promoted).await.unwrap();
        tx.commit().await.unwrap();
        freeze.await.unwrap().unwrap();

        let mut conn = store.acquire().await.unwrap();
        assert_eq!(tracking::get(&mut conn, "https://a").await.unwrap(), Some(promoted));
        assert_eq!(tracking::get(&mut conn, "https://b").await.unwrap(), Some(Tier::FROZEN));
    }

    #[tokio::test]
    async fn test_totals_count_each_table() {
        let store = Store::open_in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tracking::insert(&mut tx, "https://a", Tier::FRESH).await.unwrap();
        tracking::insert(&mut tx, "https://b", Tier::FRESH).await.unwrap();
        tx.commit().await.unwrap();

        let totals = store.totals().await.unwrap();
        assert_eq!(totals.resources, 2);
        assert_eq!(totals.snapshots, 0);
        assert_eq!(totals.fetches, 0);
    }
}
