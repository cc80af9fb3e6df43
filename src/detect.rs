//! Change detection: deciding whether fetched content is a new version.

use crate::error::Result;
use crate::models::ArticleFields;
use crate::store::snapshots;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

/// What the detector did with one successfully extracted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// The content differs from a previously stored version.
    pub changed: bool,
    /// Set whenever a snapshot was appended, including the first one.
    pub snapshot_id: Option<i64>,
}

impl Detection {
    /// First stored version of an article.
    pub fn is_new(&self) -> bool {
        !self.changed && self.snapshot_id.is_some()
    }
}

/// Compares extracted fields with the latest stored snapshot and appends
/// a new one when they differ (or none exists yet).
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    keep_raw_content: bool,
}

impl ChangeDetector {
    pub fn new(keep_raw_content: bool) -> Self {
        Self { keep_raw_content }
    }

    /// Runs on the caller's connection so the snapshot append shares the
    /// caller's transaction with the fetch record that follows it.
    pub async fn detect(
        &self,
        conn: &mut SqliteConnection,
        url: &str,
        fields: &ArticleFields,
        fetched_at: DateTime<Utc>,
        raw_content: &str,
    ) -> Result<Detection> {
        let raw = self.keep_raw_content.then_some(raw_content);

        let Some(latest) = snapshots::latest(conn, url).await? else {
            let id = snapshots::append(conn, url, fetched_at, raw, fields).await?;
            info!(%url, snapshot_id = id, "Stored first version");
            return Ok(Detection {
                changed: false,
                snapshot_id: Some(id),
            });
        };

        if latest.fields == *fields {
            debug!(%url, "Content unchanged");
            return Ok(Detection {
                changed: false,
                snapshot_id: None,
            });
        }

        let id = snapshots::append(conn, url, fetched_at, raw, fields).await?;
        info!(%url, previous = latest.id, snapshot_id = id, "Article edited; stored new version");
        Ok(Detection {
            changed: true,
            snapshot_id: Some(id),
        })
    }
}
