//! Tier evaluation from article age.

use crate::error::Result;
use crate::models::Tier;
use crate::store::{Store, fetch_log, tracking};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Tier an article of the given age belongs in.
///
/// Each bucket is upper-bound inclusive: an article exactly 3h old is still
/// tier 1, one second later it is tier 2.
pub fn tier_for_age(age: Duration) -> Tier {
    let level = if age <= Duration::hours(3) {
        1
    } else if age <= Duration::hours(24) {
        2
    } else if age <= Duration::hours(48) {
        3
    } else if age <= Duration::weeks(1) {
        4
    } else if age <= Duration::weeks(4) {
        5
    } else {
        6
    };
    Tier(level)
}

/// Outcome of one tier update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierUpdate {
    /// Articles at tiers 1-5 that have an age baseline.
    pub checked: usize,
    pub promoted: usize,
    /// Tracked at tiers 1-5 but never attempted, so their age is unknown.
    pub without_baseline: usize,
}

/// Recomputes tiers 1-5 from age. Tiers 0 and 6 are never touched.
#[derive(Debug, Clone)]
pub struct TierEvaluator {
    store: Store,
}

impl TierEvaluator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Promote every article whose age has moved it into a later bucket.
    ///
    /// Age is measured from the article's first fetch attempt. A tier is
    /// only ever raised, never lowered. All updates commit together.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<TierUpdate> {
        let mut tx = self.store.begin().await?;
        let mut summary = TierUpdate::default();

        for current in Tier::SCHEDULED.into_iter().filter(|t| t.is_age_evaluated()) {
            for url in tracking::list_by_tier(&mut tx, current).await? {
                let Some(first_attempt) = fetch_log::earliest_attempt_time(&mut tx, &url).await?
                else {
                    summary.without_baseline += 1;
                    continue;
                };
                summary.checked += 1;

                let target = tier_for_age(now - first_attempt).max(current);
                if target != current {
                    debug!(%url, from = %current, to = %target, "Promoting article");
                    tracking::set_tier(&mut tx, &url, target).await?;
                    summary.promoted += 1;
                }
            }
        }

        tx.commit().await?;
        info!(
            checked = summary.checked,
            promoted = summary.promoted,
            without_baseline = summary.without_baseline,
            "Tier update complete"
        );
        Ok(summary)
    }
}
