//! Fetch phase: retrieve every due article, politely, and record the result.
//!
//! Requests run with bounded concurrency (`buffer_unordered`, as the article
//! pipeline always has) while a shared [`Pacer`] keeps request starts at
//! least one politeness delay apart. All writes for one URL (the optional
//! snapshot and its fetch record) commit in one transaction, and writers are
//! serialized so the store sees at most one at a time.

use crate::alerts::{AlertSink, request_error_message};
use crate::detect::{ChangeDetector, Detection};
use crate::error::Result;
use crate::http::{HttpRetriever, Pacer, Retrieval};
use crate::models::{FetchOutcome, NewFetchRecord, Tier};
use crate::schedule::DueSet;
use crate::scrapers::Extractor;
use crate::store::{Store, fetch_log};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Tallies for one fetch phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// First version stored for a newly tracked article.
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl FetchSummary {
    fn record(&mut self, attempt: Attempt) {
        match attempt {
            Attempt::Failed(_) => self.failed += 1,
            Attempt::Fetched(d) => {
                self.succeeded += 1;
                if d.changed {
                    self.changed += 1;
                } else if d.is_new() {
                    self.new += 1;
                } else {
                    self.unchanged += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Fetched(Detection),
    Failed(FetchOutcome),
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub politeness_delay: Duration,
    pub request_timeout: Duration,
    pub max_concurrent: usize,
}

pub struct FetchExecutor<H, X, A> {
    store: Store,
    retriever: H,
    extractor: X,
    alerts: A,
    detector: ChangeDetector,
    pacer: Pacer,
    timeout: Duration,
    max_concurrent: usize,
    writer: Mutex<()>,
}

impl<H, X, A> FetchExecutor<H, X, A>
where
    H: HttpRetriever,
    X: Extractor,
    A: AlertSink,
{
    pub fn new(
        store: Store,
        retriever: H,
        extractor: X,
        alerts: A,
        detector: ChangeDetector,
        settings: FetchSettings,
    ) -> Self {
        Self {
            store,
            retriever,
            extractor,
            alerts,
            detector,
            pacer: Pacer::new(settings.politeness_delay),
            timeout: settings.request_timeout,
            max_concurrent: settings.max_concurrent.max(1),
            writer: Mutex::new(()),
        }
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    /// Fetch every URL in `due`. Attempt times are `started_at` plus the
    /// time elapsed since the phase began.
    ///
    /// Retrieval failures are recorded and alerted, never returned. A
    /// persistence error stops the phase and is returned; the URL it hit
    /// keeps none of its writes.
    #[instrument(level = "info", skip_all, fields(due = due.len()))]
    pub async fn run(&self, due: &DueSet, started_at: DateTime<Utc>) -> Result<FetchSummary> {
        let clock = Instant::now();

        let summary = stream::iter(due.urls.iter())
            .map(|(url, tier)| self.fetch_one(url, *tier, started_at, clock))
            .buffer_unordered(self.max_concurrent)
            .try_fold(FetchSummary::default(), |mut summary, attempt| async move {
                summary.record(attempt);
                Ok(summary)
            })
            .await?;

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            new = summary.new,
            changed = summary.changed,
            unchanged = summary.unchanged,
            "Fetch phase complete"
        );
        Ok(summary)
    }

    async fn fetch_one(
        &self,
        url: &str,
        tier: Tier,
        started_at: DateTime<Utc>,
        clock: Instant,
    ) -> Result<Attempt> {
        self.pacer.wait_turn().await;
        let attempted_at =
            started_at + chrono::Duration::from_std(clock.elapsed()).unwrap_or(chrono::Duration::zero());

        match self.retriever.fetch(url, self.timeout).await {
            Retrieval::Success(raw) => {
                let fields = self.extractor.extract(&raw);

                let _writer = self.writer.lock().await;
                let mut tx = self.store.begin().await?;
                let detection = self
                    .detector
                    .detect(&mut tx, url, &fields, attempted_at, &raw)
                    .await?;
                let record = NewFetchRecord::succeeded(
                    url,
                    tier,
                    attempted_at,
                    detection.changed,
                    detection.snapshot_id,
                );
                fetch_log::append(&mut tx, &record).await?;
                tx.commit().await?;
                Ok(Attempt::Fetched(detection))
            }
            failure => {
                let outcome = failure.outcome();
                {
                    let _writer = self.writer.lock().await;
                    let mut conn = self.store.acquire().await?;
                    let record = NewFetchRecord::failed(url, tier, attempted_at, outcome);
                    fetch_log::append(&mut conn, &record).await?;
                }
                warn!(%url, %tier, %outcome, "Fetch failed");
                self.alerts
                    .notify(&request_error_message(url, attempted_at, outcome))
                    .await;
                Ok(Attempt::Failed(outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleFields;
    use crate::scrapers::bbc::BbcExtractor;
    use crate::store::{snapshots, tracking};
    use crate::testing::{PassThroughExtractor, RecordingAlerts, ScriptedRetriever};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()
    }

    fn settings(max_concurrent: usize) -> FetchSettings {
        FetchSettings {
            politeness_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(1),
            max_concurrent,
        }
    }

    fn executor(
        store: &Store,
        retriever: &ScriptedRetriever,
        alerts: &RecordingAlerts,
        max_concurrent: usize,
    ) -> FetchExecutor<ScriptedRetriever, PassThroughExtractor, RecordingAlerts> {
        FetchExecutor::new(
            store.clone(),
            retriever.clone(),
            PassThroughExtractor,
            alerts.clone(),
            ChangeDetector::new(true),
            settings(max_concurrent),
        )
    }

    async fn track(store: &Store, urls: &[&str]) -> DueSet {
        let mut conn = store.acquire().await.unwrap();
        let mut due = DueSet::default();
        for url in urls {
            tracking::insert(&mut conn, url, Tier::FRESH).await.unwrap();
            due.urls.insert(url.to_string(), Tier::FRESH);
        }
        due
    }

    #[tokio::test]
    async fn test_edited_article_records_change() {
        let store = Store::open_in_memory().await.unwrap();
        let retriever = ScriptedRetriever::new();
        let alerts = RecordingAlerts::default();
        let due = track(&store, &["https://b"]).await;
        {
            let mut conn = store.acquire().await.unwrap();
            let x = ArticleFields {
                headline: Some("Headline".into()),
                body: Some("X".into()),
                ..Default::default()
            };
            snapshots::append(&mut conn, "https://b", now(), None, &x).await.unwrap();
        }
        retriever.push("https://b", Retrieval::Success("Y".into()));
        retriever.push("https://b", Retrieval::Success("Y".into()));
        let exec = executor(&store, &retriever, &alerts, 1);

        let first = exec.run(&due, now()).await.unwrap();
        assert_eq!(first.changed, 1);
        let second = exec.run(&due, now()).await.unwrap();
        assert_eq!(second.unchanged, 1);

        let mut conn = store.acquire().await.unwrap();
        let records = fetch_log::records_for(&mut conn, "https://b").await.unwrap();
        let latest = snapshots::latest(&mut conn, "https://b").await.unwrap().unwrap();
        assert_eq!(latest.fields.body.as_deref(), Some("Y"));
        assert!(records[0].changed);
        assert_eq!(records[0].snapshot_id, Some(latest.id));
        assert!(!records[1].changed);
        assert_eq!(records[1].snapshot_id, None);
        assert_eq!(snapshots::count_for(&mut conn, "https://b").await.unwrap(), 2);
        assert!(alerts.messages().is_empty());
    }

    #[tokio::test]
    async fn test_restyled_bbc_page_is_not_a_new_version() {
        let page = |class: &str| {
            format!(
                r#"<html><body><h1 class="{class}-h">Storm hits coast</h1>
                <time data-testid="timestamp" datetime="2025-05-06T08:00:00.000Z">6 May</time>
                <div data-component="text-block"><p class="{class}-p">Winds of <b class="{class}-b">90mph</b>.</p></div>
                </body></html>"#
            )
        };
        let store = Store::open_in_memory().await.unwrap();
        let retriever = ScriptedRetriever::new();
        let alerts = RecordingAlerts::default();
        let due = track(&store, &["https://bbc/a"]).await;
        retriever.push("https://bbc/a", Retrieval::Success(page("sc-1a2b")));
        retriever.push("https://bbc/a", Retrieval::Success(page("ssrcss-9zq")));
        let exec = FetchExecutor::new(
            store.clone(),
            retriever.clone(),
            BbcExtractor,
            alerts.clone(),
            ChangeDetector::new(true),
            settings(1),
        );

        assert_eq!(exec.run(&due, now()).await.unwrap().new, 1);
        let second = exec.run(&due, now()).await.unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.changed, 0);

        let mut conn = store.acquire().await.unwrap();
        assert_eq!(snapshots::count_for(&mut conn, "https://bbc/a").await.unwrap(), 1);
        let records = fetch_log::records_for(&mut conn, "https://bbc/a").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].changed);
        assert_eq!(records[1].snapshot_id, None);
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_and_alerted() {
        let store = Store::open_in_memory().await.unwrap();
        let retriever = ScriptedRetriever::new();
        let alerts = RecordingAlerts::default();
        let due = track(&store, &["https://c"]).await;
        retriever.push("https://c", Retrieval::Timeout);

        let summary = executor(&store, &retriever, &alerts, 1).run(&due, now()).await.unwrap();
        assert_eq!(summary.failed, 1);

        let mut conn = store.acquire().await.unwrap();
        let records = fetch_log::records_for(&mut conn, "https://c").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, FetchOutcome::Timeout);
        assert!(!records[0].changed);
        assert_eq!(records[0].snapshot_id, None);
        assert_eq!(tracking::get(&mut conn, "https://c").await.unwrap(), Some(Tier::FRESH));
        assert_eq!(alerts.messages().len(), 1);
        assert!(alerts.messages()[0].contains("timeout"));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_with_concurrency() {
        let store = Store::open_in_memory().await.unwrap();
        let retriever = ScriptedRetriever::new();
        let alerts = RecordingAlerts::default();
        let due = track(&store, &["https://1", "https://2", "https://3", "https://4"]).await;
        retriever.push("https://1", Retrieval::Success("one".into()));
        retriever.push("https://2", Retrieval::HttpError(404));
        retriever.push("https://3", Retrieval::Success("three".into()));
        // https://4 is unscripted and fails to connect

        let summary = executor(&store, &retriever, &alerts, 3).run(&due, now()).await.unwrap();
        assert_eq!(
            summary,
            FetchSummary {
                succeeded: 2,
                failed: 2,
                new: 2,
                changed: 0,
                unchanged: 0
            }
        );
        assert_eq!(retriever.calls().len(), 4);
        assert_eq!(store.totals().await.unwrap().fetches, 4);
        assert_eq!(store.totals().await.unwrap().snapshots, 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_returned() {
        let store = Store::open_in_memory().await.unwrap();
        let retriever = ScriptedRetriever::new();
        let alerts = RecordingAlerts::default();
        // Not in the tracking table, so the snapshot insert violates its foreign key
        let mut due = DueSet::default();
        due.urls.insert("https://ghost".to_string(), Tier::FRESH);
        retriever.push("https://ghost", Retrieval::Success("boo".into()));

        let err = executor(&store, &retriever, &alerts, 1)
            .run(&due, now())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        let totals = store.totals().await.unwrap();
        assert_eq!((totals.snapshots, totals.fetches), (0, 0));
    }
}
