//! Table creation. Every statement is idempotent and runs on each startup.

use crate::error::Result;
use sqlx::SqlitePool;

pub(super) async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_tracking_table(pool).await?;
    create_snapshot_table(pool).await?;
    create_fetch_table(pool).await?;
    Ok(())
}

async fn create_tracking_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracking (
            url TEXT PRIMARY KEY,
            tier INTEGER NOT NULL CHECK (tier BETWEEN 0 AND 6)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracking_tier ON tracking(tier)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_snapshot_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshot (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL REFERENCES tracking(url),
            fetched_at TEXT NOT NULL,
            raw_content TEXT,
            headline TEXT,
            body TEXT,
            byline TEXT,
            timestamp_text TEXT,
            has_parse_errors INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshot_url ON snapshot(url, id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_fetch_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fetch (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL REFERENCES tracking(url),
            tier_at_attempt INTEGER NOT NULL CHECK (tier_at_attempt BETWEEN 0 AND 6),
            attempted_at TEXT NOT NULL,
            outcome TEXT NOT NULL,
            changed INTEGER NOT NULL DEFAULT 0,
            snapshot_id INTEGER REFERENCES snapshot(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fetch_url ON fetch(url, id)")
        .execute(pool)
        .await?;
    Ok(())
}
