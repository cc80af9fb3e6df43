//! Weekly summary of what the monitor has collected.

use crate::alerts::AlertSink;
use crate::config::WeeklyReportConfig;
use crate::error::Result;
use crate::store::{Store, StoreTotals};
use crate::utils::thousands;
use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use tracing::{debug, info};

/// A fixed weekly slot, e.g. Saturday at 10:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchedule {
    pub weekday: Weekday,
    pub at: NaiveTime,
}

impl ReportSchedule {
    pub fn new(weekday: Weekday, at: NaiveTime) -> Self {
        Self { weekday, at }
    }

    /// The latest slot at or before `now`.
    pub fn last_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let days_back = (today.weekday().num_days_from_monday() + 7
            - self.weekday.num_days_from_monday())
            % 7;
        let day = today - Days::new(days_back as u64);
        let slot = day.and_time(self.at).and_utc();
        if slot > now { slot - Days::new(7) } else { slot }
    }

    /// Whether a slot has passed since the report was last sent.
    pub fn is_due(&self, now: DateTime<Utc>, last_sent: DateTime<Utc>) -> bool {
        self.last_occurrence(now) > last_sent
    }
}

pub fn weekly_report_message(totals: &StoreTotals) -> String {
    format!(
        "<b>*** Weekly Report ***</b>\n\
         Total unique articles: <b>{}</b>\n\
         Total article snapshots: <b>{}</b>\n\
         Total article fetches: <b>{}</b>",
        thousands(totals.resources),
        thousands(totals.snapshots),
        thousands(totals.fetches)
    )
}

/// Gathers the totals and sends the report through `alerts`.
pub async fn send_weekly_report<A: AlertSink>(store: &Store, alerts: &A) -> Result<StoreTotals> {
    let totals = store.totals().await?;
    alerts.notify(&weekly_report_message(&totals)).await;
    info!(
        resources = totals.resources,
        snapshots = totals.snapshots,
        fetches = totals.fetches,
        "Weekly report sent"
    );
    Ok(totals)
}

/// Tracks when the weekly report last went out.
#[derive(Debug, Clone)]
pub struct WeeklyReporter {
    schedule: Option<ReportSchedule>,
    last_sent: DateTime<Utc>,
}

impl WeeklyReporter {
    /// Slots before `started_at` are never reported, so a restart does not
    /// resend the previous report.
    pub fn new(config: &WeeklyReportConfig, started_at: DateTime<Utc>) -> Self {
        let schedule = config
            .enabled
            .then(|| ReportSchedule::new(config.weekday, config.time));
        Self {
            schedule,
            last_sent: started_at,
        }
    }

    /// Send the report if a slot has passed. Returns whether it was sent.
    pub async fn run_pending<A: AlertSink>(
        &mut self,
        store: &Store,
        alerts: &A,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(schedule) = self.schedule else {
            return Ok(false);
        };
        if !schedule.is_due(now, self.last_sent) {
            debug!(next_after = %self.last_sent, "Weekly report not due");
            return Ok(false);
        }
        send_weekly_report(store, alerts).await?;
        self.last_sent = now;
        Ok(true)
    }
}
