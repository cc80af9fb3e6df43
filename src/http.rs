//! HTTP retrieval with per-request timeouts and politeness spacing.
//!
//! Retrieval failures are not Rust errors here. A timeout, a refused
//! connection or a 503 all come back as a [`Retrieval`] value the fetch
//! executor records and moves past; only client construction can fail.

use crate::error::Result;
use crate::models::{FetchOutcome, NetworkErrorKind};
use reqwest::{Client, StatusCode, redirect::Policy};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Result of one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    Success(String),
    HttpError(u16),
    NetworkError(NetworkErrorKind),
    Timeout,
}

impl Retrieval {
    pub fn outcome(&self) -> FetchOutcome {
        match self {
            Retrieval::Success(_) => FetchOutcome::Success,
            Retrieval::HttpError(code) => FetchOutcome::HttpError(*code),
            Retrieval::NetworkError(kind) => FetchOutcome::NetworkError(*kind),
            Retrieval::Timeout => FetchOutcome::Timeout,
        }
    }
}

/// Something that can retrieve a document by URL.
///
/// Implemented by [`ReqwestRetriever`] for real traffic and by scripted
/// fakes in tests.
pub trait HttpRetriever {
    /// Retrieve `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Retrieval;
}

/// [`HttpRetriever`] backed by one shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestRetriever {
    client: Client,
}

impl ReqwestRetriever {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(8))
            .build()?;
        Ok(Self { client })
    }

    #[cfg(test)]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpRetriever for ReqwestRetriever {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Retrieval {
        // reqwest's own timeout covers the body; the outer one also bounds DNS stalls
        let send = self.client.get(url).timeout(timeout).send();
        let response = match tokio::time::timeout(timeout, send).await {
            Err(_) => return Retrieval::Timeout,
            Ok(Err(e)) => return classify_error(&e),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status != StatusCode::OK {
            debug!(%url, status = status.as_u16(), "Non-200 response");
            return Retrieval::HttpError(status.as_u16());
        }

        match response.bytes().await {
            // Pages are served as UTF-8 regardless of what the headers claim
            Ok(body) => Retrieval::Success(String::from_utf8_lossy(&body).into_owned()),
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> Retrieval {
    if e.is_timeout() {
        return Retrieval::Timeout;
    }
    let kind = if e.is_connect() {
        NetworkErrorKind::Connect
    } else if e.is_redirect() {
        NetworkErrorKind::Redirect
    } else if e.is_body() {
        NetworkErrorKind::Body
    } else if e.is_decode() {
        NetworkErrorKind::Decode
    } else if e.is_request() {
        NetworkErrorKind::Request
    } else {
        NetworkErrorKind::Other
    };
    warn!(error = %e, kind = kind.as_str(), "Request failed");
    Retrieval::NetworkError(kind)
}

/// Whether the network path to the source works at all.
///
/// Any HTTP status counts as online since the server answered. Only a
/// timeout or a failure below HTTP means the host or its link is down.
#[instrument(level = "debug", skip(retriever))]
pub async fn probe_online<H: HttpRetriever>(retriever: &H, probe_url: &str, timeout: Duration) -> bool {
    match retriever.fetch(probe_url, timeout).await {
        Retrieval::Success(_) | Retrieval::HttpError(_) => true,
        Retrieval::NetworkError(_) | Retrieval::Timeout => false,
    }
}

/// Hands out request start times at least `spacing` apart.
///
/// Shared by every concurrent fetch task, so the politeness delay holds
/// for the source as a whole rather than per task.
#[derive(Debug)]
pub struct Pacer {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until this caller may start its request.
    pub async fn wait_turn(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.spacing);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
