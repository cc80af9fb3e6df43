//! Discovery: start tracking articles that newly appeared on the index page.

use crate::error::Result;
use crate::models::Tier;
use crate::scrapers::IndexSource;
use crate::store::{Store, tracking};
use serde::Serialize;
use tracing::{error, info, instrument};

/// How the discovery phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    Added { candidates: usize, added: usize },
    /// The index page could not be read; the rest of the cycle still runs.
    Skipped { reason: String },
}

pub struct Discovery<I> {
    store: Store,
    index: I,
    index_url: String,
}

impl<I: IndexSource> Discovery<I> {
    pub fn new(store: Store, index: I, index_url: impl Into<String>) -> Self {
        Self {
            store,
            index,
            index_url: index_url.into(),
        }
    }

    /// Insert every unseen candidate at tier 1, all in one transaction.
    ///
    /// An index failure is reported as [`DiscoveryOutcome::Skipped`]; only
    /// persistence errors are returned.
    #[instrument(level = "info", skip(self), fields(index = %self.index_url))]
    pub async fn run(&self) -> Result<DiscoveryOutcome> {
        let candidates = match self.index.candidate_urls(&self.index_url).await {
            Ok(urls) => urls,
            Err(e) => {
                error!(error = %e, "Index unavailable; skipping discovery this cycle");
                return Ok(DiscoveryOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        let mut tx = self.store.begin().await?;
        let known = tracking::list_all(&mut tx).await?;
        let mut added = 0;
        for url in candidates.difference(&known) {
            tracking::insert(&mut tx, url, Tier::FRESH).await?;
            info!(%url, "Tracking new article");
            added += 1;
        }
        tx.commit().await?;

        info!(candidates = candidates.len(), added, "Discovery complete");
        Ok(DiscoveryOutcome::Added {
            candidates: candidates.len(),
            added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedIndex;

    #[tokio::test]
    async fn test_only_unseen_urls_are_added() {
        let store = Store::open_in_memory().await.unwrap();
        {
            let mut conn = store.acquire().await.unwrap();
            tracking::insert(&mut conn, "https://old", Tier::new(3).unwrap()).await.unwrap();
        }
        let index = FixedIndex::new(["https://old", "https://a", "https://b"]);

        let outcome = Discovery::new(store.clone(), index, "https://index").run().await.unwrap();
        assert_eq!(
            outcome,
            DiscoveryOutcome::Added {
                candidates: 3,
                added: 2
            }
        );

        let mut conn = store.acquire().await.unwrap();
        assert_eq!(tracking::get(&mut conn, "https://a").await.unwrap(), Some(Tier::FRESH));
        // Existing rows keep their tier
        assert_eq!(
            tracking::get(&mut conn, "https://old").await.unwrap(),
            Some(Tier::new(3).unwrap())
        );
    }

    #[tokio::test]
    async fn test_rerun_adds_nothing() {
        let store = Store::open_in_memory().await.unwrap();
        let discovery = Discovery::new(store.clone(), FixedIndex::new(["https://a"]), "https://index");
        discovery.run().await.unwrap();

        let again = discovery.run().await.unwrap();
        assert_eq!(
            again,
            DiscoveryOutcome::Added {
                candidates: 1,
                added: 0
            }
        );
    }

    #[tokio::test]
    async fn test_index_failure_skips() {
        let store = Store::open_in_memory().await.unwrap();
        let outcome = Discovery::new(store.clone(), FixedIndex::failing(), "https://index")
            .run()
            .await
            .unwrap();
        assert!(matches!(outcome, DiscoveryOutcome::Skipped { reason } if reason.contains("503")));
        assert_eq!(store.totals().await.unwrap().resources, 0);
    }
}
