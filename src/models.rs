//! Data models for tracked articles, fetch attempts and stored versions.
//!
//! This module defines the core data structures shared by every phase of a
//! monitoring cycle:
//! - [`Tier`]: the polling bucket a tracked article currently sits in
//! - [`ArticleFields`]: the fixed-shape content extracted from one article page
//! - [`FetchOutcome`]: how a single retrieval attempt ended
//! - [`FetchRecord`] / [`NewFetchRecord`]: rows of the append-only fetch log
//! - [`Snapshot`]: one stored, distinct version of an article's content

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Polling bucket of a tracked article.
///
/// | Tier | Meaning |
/// |------|---------|
/// | 0 | Frozen by an operator; never re-evaluated, never fetched |
/// | 1-5 | Re-evaluated from article age every cycle |
/// | 6 | Terminal bucket for the oldest articles |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Tier(pub(crate) u8);

impl Tier {
    /// Manually excluded from scheduling.
    pub const FROZEN: Tier = Tier(0);
    /// Where every newly discovered article starts.
    pub const FRESH: Tier = Tier(1);
    /// Oldest bucket; nothing is promoted past it.
    pub const TERMINAL: Tier = Tier(6);

    /// Tiers that take part in the due-set calculation, in order.
    pub const SCHEDULED: [Tier; 6] = [Tier(1), Tier(2), Tier(3), Tier(4), Tier(5), Tier(6)];

    pub fn new(level: u8) -> Result<Self> {
        if level <= 6 {
            Ok(Tier(level))
        } else {
            Err(Error::InvalidTier(level as i64))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Whether the tier evaluator recomputes this tier from age (tiers 1-5).
    pub fn is_age_evaluated(self) -> bool {
        (1..=5).contains(&self.0)
    }
}

impl TryFrom<i64> for Tier {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map_err(|_| Error::InvalidTier(value))
            .and_then(Tier::new)
    }
}

impl From<Tier> for i64 {
    fn from(tier: Tier) -> i64 {
        tier.0 as i64
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content extracted from one article page.
///
/// Text fields arrive already normalized by the extractor (one paragraph per
/// line, decorative markup stripped), so two fetches of an unedited article
/// compare equal with plain `==`. A `None` field means the extractor could not
/// find it; `has_parse_errors` records whether that was unexpected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFields {
    pub headline: Option<String>,
    pub body: Option<String>,
    pub byline: Option<String>,
    /// Timestamps shown on the page, verbatim.
    pub timestamp_text: Option<String>,
    pub has_parse_errors: bool,
}

/// Reason a retrieval failed below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Connect,
    Redirect,
    Body,
    Decode,
    Request,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Request => "request",
            Self::Other => "other",
        }
    }
}

impl FromStr for NetworkErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connect" => Ok(Self::Connect),
            "redirect" => Ok(Self::Redirect),
            "body" => Ok(Self::Body),
            "decode" => Ok(Self::Decode),
            "request" => Ok(Self::Request),
            "other" => Ok(Self::Other),
            _ => Err(Error::CorruptRecord(format!("unknown network error kind {s:?}"))),
        }
    }
}

/// How a single retrieval attempt ended.
///
/// Stored in the `fetch.outcome` column as `success`, `http:<code>`,
/// `network:<kind>` or `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success,
    HttpError(u16),
    NetworkError(NetworkErrorKind),
    Timeout,
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success => f.write_str("success"),
            FetchOutcome::HttpError(code) => write!(f, "http:{code}"),
            FetchOutcome::NetworkError(kind) => write!(f, "network:{}", kind.as_str()),
            FetchOutcome::Timeout => f.write_str("timeout"),
        }
    }
}

impl FromStr for FetchOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            None if s == "success" => Ok(FetchOutcome::Success),
            None if s == "timeout" => Ok(FetchOutcome::Timeout),
            Some(("http", code)) => code
                .parse()
                .map(FetchOutcome::HttpError)
                .map_err(|_| Error::CorruptRecord(format!("bad http status in outcome {s:?}"))),
            Some(("network", kind)) => kind.parse().map(FetchOutcome::NetworkError),
            _ => Err(Error::CorruptRecord(format!("unknown fetch outcome {s:?}"))),
        }
    }
}

/// A fetch log row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRecord {
    pub id: i64,
    pub url: String,
    pub tier_at_attempt: Tier,
    pub attempted_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    /// Only meaningful when `outcome` is [`FetchOutcome::Success`].
    pub changed: bool,
    pub snapshot_id: Option<i64>,
}

/// A fetch log row before the store assigns its id.
///
/// Built only once the attempt is fully resolved, so the single append
/// already carries the final outcome, `changed` flag and snapshot link.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFetchRecord {
    pub url: String,
    pub tier_at_attempt: Tier,
    pub attempted_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    pub changed: bool,
    pub snapshot_id: Option<i64>,
}

impl NewFetchRecord {
    /// Record for an attempt that never produced a page.
    pub fn failed(url: &str, tier: Tier, attempted_at: DateTime<Utc>, outcome: FetchOutcome) -> Self {
        Self {
            url: url.to_string(),
            tier_at_attempt: tier,
            attempted_at,
            outcome,
            changed: false,
            snapshot_id: None,
        }
    }

    /// Record for a retrieved page, carrying the change detector's verdict.
    pub fn succeeded(
        url: &str,
        tier: Tier,
        attempted_at: DateTime<Utc>,
        changed: bool,
        snapshot_id: Option<i64>,
    ) -> Self {
        Self {
            url: url.to_string(),
            tier_at_attempt: tier,
            attempted_at,
            outcome: FetchOutcome::Success,
            changed,
            snapshot_id,
        }
    }
}

/// One stored version of an article.
///
/// Snapshots of the same URL ordered by `id` form the article's edit history;
/// consecutive versions always differ in at least one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    /// Raw page, kept so fields can be re-derived with a newer extractor.
    pub raw_content: Option<String>,
    pub fields: ArticleFields,
}
