//! # Awful News Monitor
//!
//! Watches news articles after publication and records every edit made to
//! them, while keeping request volume against the source low.
//!
//! ## Features
//!
//! - Discovers new BBC News articles from the front page
//! - Polls each article on an age-based schedule (tiers 1-6, every 15 minutes
//!   down to every 4 weeks); operators can freeze articles at tier 0
//! - Stores a snapshot only when the extracted headline, body, byline or
//!   timestamp actually differ from the last stored version
//! - Logs every fetch attempt; failures are alerted via Telegram or the log
//! - Sends a weekly summary report
//!
//! ## Usage
//!
//! ```sh
//! awful_news_monitor -c monitor.yaml run
//! ```
//!
//! ## Architecture
//!
//! Each cycle runs these phases in order:
//! 1. **Tier update**: promote articles whose age moved them to a slower tier
//! 2. **Discovery**: start tracking articles newly linked from the index page
//! 3. **Due set**: pick the articles whose re-check interval has elapsed
//! 4. **Fetching**: retrieve them politely, store new versions, log attempts

use chrono::{DateTime, Utc};
use clap::Parser;
use std::error::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod alerts;
mod cli;
mod config;
mod cycle;
mod detect;
mod discovery;
mod error;
mod fetch;
mod http;
mod models;
mod report;
mod schedule;
mod scrapers;
mod store;
#[cfg(test)]
mod testing;
mod utils;

use alerts::{AlertSink, ConfiguredAlertSink, fatal_message};
use cli::{Cli, Command};
use config::MonitorConfig;
use cycle::{CycleController, CycleReport};
use detect::ChangeDetector;
use discovery::Discovery;
use fetch::{FetchExecutor, FetchSettings};
use http::{HttpRetriever, ReqwestRetriever, probe_online};
use models::Tier;
use report::{WeeklyReporter, send_weekly_report};
use schedule::{DueSetCalculator, TierEvaluator};
use scrapers::bbc::{BbcExtractor, BbcIndex};
use scrapers::{Extractor, IndexSource};
use store::{Store, fetch_log, snapshots, tracking};

type Monitor = CycleController<ReqwestRetriever, BbcExtractor, BbcIndex<ReqwestRetriever>, ConfiguredAlertSink>;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "news monitor starting up");

    let args = Cli::parse();
    debug!(?args.command, ?args.config, "Parsed CLI arguments");
    let config = args.load_config()?;

    let store = Store::open(&config.database_path).await?;
    let alerts = ConfiguredAlertSink::from_config(&config.telegram)?;

    let result = match &args.command {
        Command::Run => run(&config, &store, alerts).await,
        Command::Once => once(&config, &store, alerts).await,
        Command::Freeze { url } => freeze(&store, url).await,
        Command::History { url } => history(&store, url).await,
        Command::Report => {
            let sent = send_weekly_report(&store, &alerts).await;
            alerts.flush().await;
            sent.map(|_| ())
        }
    };

    store.close().await;
    Ok(result?)
}

fn build_monitor(
    config: &MonitorConfig,
    store: &Store,
    alerts: ConfiguredAlertSink,
) -> error::Result<(Monitor, ReqwestRetriever)> {
    let retriever = ReqwestRetriever::new(&config.user_agent)?;
    let settings = FetchSettings {
        politeness_delay: config.politeness_delay(),
        request_timeout: config.request_timeout(),
        max_concurrent: config.max_concurrent_fetches,
    };
    let monitor = CycleController::new(
        TierEvaluator::new(store.clone()),
        Discovery::new(
            store.clone(),
            BbcIndex::new(retriever.clone(), config.request_timeout()),
            config.index_url.clone(),
        ),
        DueSetCalculator::new(store.clone()),
        FetchExecutor::new(
            store.clone(),
            retriever.clone(),
            BbcExtractor,
            alerts,
            ChangeDetector::new(config.store_raw_content),
            settings,
        ),
    );
    Ok((monitor, retriever))
}

/// Cycle on every tick until Ctrl-C or a fatal error.
///
/// A tick that falls due while a cycle is still running is delayed until it
/// finishes, never run alongside it.
#[instrument(level = "info", skip_all)]
async fn run(config: &MonitorConfig, store: &Store, alerts: ConfiguredAlertSink) -> error::Result<()> {
    let (mut monitor, retriever) = build_monitor(config, store, alerts)?;
    let mut reporter = WeeklyReporter::new(&config.weekly_report, Utc::now());

    let mut ticker = tokio::time::interval(config.cycle_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = config.cycle_interval_secs, "Monitoring started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested; exiting between cycles");
                monitor.alerts().flush().await;
                return Ok(());
            }
        }
        info!("Waking up");

        match wake(&mut monitor, &mut reporter, store, &retriever, config, Utc::now()).await {
            Ok(Some(report)) => debug!(?report, "Cycle report"),
            Ok(None) => continue,
            Err(e) if !e.is_fatal() => warn!(error = %e, "Cycle aborted; retrying next tick"),
            Err(e) => return Err(fatal(&monitor, e).await),
        }
        info!(next_in_secs = config.cycle_interval_secs, "Going to sleep");
    }
}

/// One tick of the run loop: probe, weekly report, then a cycle.
///
/// Returns `None` without touching the store or the alert sink when the host
/// is offline, so a report slot that falls in an outage is sent on the first
/// tick back online.
async fn wake<H, X, I, A>(
    monitor: &mut CycleController<H, X, I, A>,
    reporter: &mut WeeklyReporter,
    store: &Store,
    retriever: &H,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> error::Result<Option<CycleReport>>
where
    H: HttpRetriever,
    X: Extractor,
    I: IndexSource,
    A: AlertSink,
{
    if !probe_online(retriever, &config.probe_url, config.request_timeout()).await {
        error!(probe = %config.probe_url, "No internet connection detected; skipping this cycle");
        return Ok(None);
    }

    reporter.run_pending(store, monitor.alerts(), now).await?;
    monitor.run_cycle(now).await.map(Some)
}

async fn fatal(monitor: &Monitor, e: error::Error) -> error::Error {
    error!(phase = %monitor.phase(), error = %e, "Critical failure; shutting down");
    monitor.alerts().notify(&fatal_message(&e.to_string())).await;
    monitor.alerts().flush().await;
    e
}

async fn once(config: &MonitorConfig, store: &Store, alerts: ConfiguredAlertSink) -> error::Result<()> {
    let (mut monitor, _) = build_monitor(config, store, alerts)?;
    let report = match monitor.run_cycle(Utc::now()).await {
        Ok(report) => report,
        Err(e) if e.is_fatal() => return Err(fatal(&monitor, e).await),
        Err(e) => {
            monitor.alerts().flush().await;
            return Err(e);
        }
    };
    monitor.alerts().flush().await;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Could not serialize cycle report"),
    }
    Ok(())
}

async fn freeze(store: &Store, url: &str) -> error::Result<()> {
    let mut conn = store.acquire().await?;
    let previous = tracking::get(&mut conn, url).await?;
    tracking::set_tier(&mut conn, url, Tier::FROZEN).await?;
    info!(%url, previous = ?previous.map(|t| t.level()), "Article frozen");
    Ok(())
}

async fn history(store: &Store, url: &str) -> error::Result<()> {
    let mut conn = store.acquire().await?;
    if tracking::get(&mut conn, url).await?.is_none() {
        return Err(error::Error::NotTracked(url.to_string()));
    }
    let versions = snapshots::count_for(&mut conn, url).await?;
    let history = snapshots::history(&mut conn, url).await?;
    let fetches = fetch_log::records_for(&mut conn, url).await?;
    let doc = serde_json::json!({
        "url": url,
        "versions": versions,
        "snapshots": history,
        "fetches": fetches,
    });
    println!("{doc:#}");
    Ok(())
}
