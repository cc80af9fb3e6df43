//! Fetch table: one immutable row per retrieval attempt.
//!
//! Rows are only ever inserted, complete, by [`append`]; nothing here updates
//! an existing row. Ordering by `id` is the attempt order for a given url.

use crate::error::Result;
use crate::models::{FetchRecord, NewFetchRecord, Tier};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

pub async fn append(conn: &mut SqliteConnection, record: &NewFetchRecord) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO fetch (url, tier_at_attempt, attempted_at, outcome, changed, snapshot_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.url)
    .bind(i64::from(record.tier_at_attempt))
    .bind(record.attempted_at)
    .bind(record.outcome.to_string())
    .bind(record.changed)
    .bind(record.snapshot_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// When `url` was last attempted, whatever the tier or outcome.
pub async fn latest_attempt_time(
    conn: &mut SqliteConnection,
    url: &str,
) -> Result<Option<DateTime<Utc>>> {
    let at = sqlx::query_scalar("SELECT attempted_at FROM fetch WHERE url = ? ORDER BY id DESC LIMIT 1")
        .bind(url)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(at)
}

/// First attempt against `url`; the baseline for its age.
pub async fn earliest_attempt_time(
    conn: &mut SqliteConnection,
    url: &str,
) -> Result<Option<DateTime<Utc>>> {
    let at = sqlx::query_scalar("SELECT attempted_at FROM fetch WHERE url = ? ORDER BY id ASC LIMIT 1")
        .bind(url)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(at)
}

/// Every attempt against `url`, oldest first.
pub async fn records_for(conn: &mut SqliteConnection, url: &str) -> Result<Vec<FetchRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, url, tier_at_attempt, attempted_at, outcome, changed, snapshot_id
        FROM fetch WHERE url = ? ORDER BY id ASC
        "#,
    )
    .bind(url)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_record).collect()
}

fn row_to_record(row: &SqliteRow) -> Result<FetchRecord> {
    let outcome: String = row.try_get("outcome")?;
    Ok(FetchRecord {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        tier_at_attempt: Tier::try_from(row.try_get::<i64, _>("tier_at_attempt")?)?,
        attempted_at: row.try_get("attempted_at")?,
        outcome: outcome.parse()?,
        changed: row.try_get("changed")?,
        snapshot_id: row.try_get("snapshot_id")?,
    })
}
