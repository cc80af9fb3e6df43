//! One monitoring cycle, phase by phase.
//!
//! ```text
//! Idle -> TierUpdate -> Discovery -> DueSetCompute -> Fetching -> Done
//! ```
//!
//! Phases run strictly in order, so each one reads everything the previous
//! phase committed. Only persistence errors escape a cycle; they leave the
//! controller in the phase that failed.

use crate::alerts::AlertSink;
use crate::discovery::{Discovery, DiscoveryOutcome};
use crate::error::Result;
use crate::fetch::{FetchExecutor, FetchSummary};
use crate::http::HttpRetriever;
use crate::schedule::{DueSetCalculator, TierEvaluator, TierUpdate};
use crate::scrapers::{Extractor, IndexSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    TierUpdate,
    Discovery,
    DueSetCompute,
    Fetching,
    Done,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub tiers: TierUpdate,
    pub discovery: DiscoveryOutcome,
    pub due_total: usize,
    /// Due articles per tier level.
    pub due_per_tier: BTreeMap<u8, usize>,
    pub fetch: FetchSummary,
    pub elapsed_ms: u64,
}

pub struct CycleController<H, X, I, A> {
    tiers: TierEvaluator,
    discovery: Discovery<I>,
    due: DueSetCalculator,
    fetcher: FetchExecutor<H, X, A>,
    phase: CyclePhase,
}

impl<H, X, I, A> CycleController<H, X, I, A>
where
    H: HttpRetriever,
    X: Extractor,
    I: IndexSource,
    A: AlertSink,
{
    pub fn new(
        tiers: TierEvaluator,
        discovery: Discovery<I>,
        due: DueSetCalculator,
        fetcher: FetchExecutor<H, X, A>,
    ) -> Self {
        Self {
            tiers,
            discovery,
            due,
            fetcher,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn alerts(&self) -> &A {
        self.fetcher.alerts()
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = %self.phase, to = %phase, "Cycle phase");
        self.phase = phase;
    }

    /// Run every phase once with `now` as the cycle's reference time.
    ///
    /// Taking `&mut self` means a controller can never run two cycles at once.
    #[instrument(level = "info", skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let clock = Instant::now();
        self.enter(CyclePhase::Idle);

        self.enter(CyclePhase::TierUpdate);
        let tiers = self.tiers.run(now).await?;

        self.enter(CyclePhase::Discovery);
        let discovery = self.discovery.run().await?;

        self.enter(CyclePhase::DueSetCompute);
        let due = self.due.compute(now).await?;
        if due.is_empty() {
            debug!("Nothing due this cycle");
        }

        self.enter(CyclePhase::Fetching);
        let fetch = self.fetcher.run(&due, now).await?;

        self.enter(CyclePhase::Done);
        let report = CycleReport {
            started_at: now,
            tiers,
            discovery,
            due_total: due.len(),
            due_per_tier: due.per_tier,
            fetch,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            due = report.due_total,
            fetched = report.fetch.succeeded,
            failed = report.fetch.failed,
            new = report.fetch.new,
            changed = report.fetch.changed,
            elapsed_ms = report.elapsed_ms,
            "Cycle complete"
        );
        Ok(report)
    }
}
