//! Snapshot table: distinct content versions, append-only.

use crate::error::Result;
use crate::models::{ArticleFields, Snapshot};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const SNAPSHOT_COLUMNS: &str =
    "id, url, fetched_at, raw_content, headline, body, byline, timestamp_text, has_parse_errors";

/// Most recent version of `url`, if any was ever stored.
pub async fn latest(conn: &mut SqliteConnection, url: &str) -> Result<Option<Snapshot>> {
    let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshot WHERE url = ? ORDER BY id DESC LIMIT 1");
    let row = sqlx::query(&sql).bind(url).fetch_optional(&mut *conn).await?;
    row.as_ref().map(row_to_snapshot).transpose()
}

pub async fn append(
    conn: &mut SqliteConnection,
    url: &str,
    fetched_at: DateTime<Utc>,
    raw_content: Option<&str>,
    fields: &ArticleFields,
) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO snapshot
            (url, fetched_at, raw_content, headline, body, byline, timestamp_text, has_parse_errors)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(url)
    .bind(fetched_at)
    .bind(raw_content)
    .bind(fields.headline.as_deref())
    .bind(fields.body.as_deref())
    .bind(fields.byline.as_deref())
    .bind(fields.timestamp_text.as_deref())
    .bind(fields.has_parse_errors)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn count_for(conn: &mut SqliteConnection, url: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM snapshot WHERE url = ?")
        .bind(url)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// All versions of `url`, oldest first.
pub async fn history(conn: &mut SqliteConnection, url: &str) -> Result<Vec<Snapshot>> {
    let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshot WHERE url = ? ORDER BY id ASC");
    let rows = sqlx::query(&sql).bind(url).fetch_all(&mut *conn).await?;
    rows.iter().map(row_to_snapshot).collect()
}

fn row_to_snapshot(row: &SqliteRow) -> Result<Snapshot> {
    Ok(Snapshot {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        fetched_at: row.try_get("fetched_at")?,
        raw_content: row.try_get("raw_content")?,
        fields: ArticleFields {
            headline: row.try_get("headline")?,
            body: row.try_get("body")?,
            byline: row.try_get("byline")?,
            timestamp_text: row.try_get("timestamp_text")?,
            has_parse_errors: row.try_get("has_parse_errors")?,
        },
    })
}
