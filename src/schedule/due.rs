//! Due-set calculation: which tracked articles are fetched this cycle.

use crate::error::Result;
use crate::models::Tier;
use crate::store::{Store, fetch_log, tracking};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Minimum time between two attempts at the given tier.
///
/// Frozen articles have no interval: they are never due.
pub fn recheck_interval(tier: Tier) -> Option<Duration> {
    match tier.level() {
        1 => Some(Duration::minutes(15)),
        2 => Some(Duration::hours(1)),
        3 => Some(Duration::hours(8)),
        4 => Some(Duration::days(1)),
        5 => Some(Duration::weeks(1)),
        6 => Some(Duration::weeks(4)),
        _ => None,
    }
}

/// Whether an article at `tier`, last attempted at `last_attempt`, is due at `now`.
///
/// Tier 1 is due every cycle, since the cycle cadence is the tier-1 interval.
/// Other tiers are due once the full interval has elapsed; an article that
/// was never attempted is due immediately.
pub fn is_due(tier: Tier, last_attempt: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(interval) = recheck_interval(tier) else {
        return false;
    };
    if tier == Tier::FRESH {
        return true;
    }
    match last_attempt {
        None => true,
        Some(at) => now - at >= interval,
    }
}

/// Articles selected for this cycle, each with the tier it is fetched at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueSet {
    pub urls: BTreeMap<String, Tier>,
    /// Due count per tier level, every scheduled tier present.
    pub per_tier: BTreeMap<u8, usize>,
}

impl DueSet {
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DueSetCalculator {
    store: Store,
}

impl DueSetCalculator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn compute(&self, now: DateTime<Utc>) -> Result<DueSet> {
        let mut conn = self.store.acquire().await?;
        let mut due = DueSet::default();

        for tier in Tier::SCHEDULED {
            let mut count = 0;
            for url in tracking::list_by_tier(&mut conn, tier).await? {
                let selected = if tier == Tier::FRESH {
                    true
                } else {
                    let last = fetch_log::latest_attempt_time(&mut conn, &url).await?;
                    is_due(tier, last, now)
                };
                if selected {
                    due.urls.insert(url, tier);
                    count += 1;
                }
            }
            due.per_tier.insert(tier.level(), count);
        }

        info!(total = due.len(), per_tier = ?due.per_tier, "Computed due set");
        Ok(due)
    }
}
