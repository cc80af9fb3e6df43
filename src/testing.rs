//! In-memory stand-ins for the network-facing collaborators.

use crate::alerts::AlertSink;
use crate::error::{Error, Result};
use crate::http::{HttpRetriever, Retrieval};
use crate::models::{ArticleFields, NetworkErrorKind};
use crate::scrapers::{Extractor, IndexSource};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays queued retrievals per URL. Unscripted URLs fail to connect.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRetriever {
    script: Arc<Mutex<HashMap<String, VecDeque<Retrieval>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, retrieval: Retrieval) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(retrieval);
    }

    /// Every URL requested so far, in request order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl HttpRetriever for ScriptedRetriever {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Retrieval {
        self.calls.lock().unwrap().push(url.to_string());
        self.script
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Retrieval::NetworkError(NetworkErrorKind::Connect))
    }
}

/// Uses the whole document as the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughExtractor;

impl Extractor for PassThroughExtractor {
    fn extract(&self, raw_document: &str) -> ArticleFields {
        ArticleFields {
            headline: Some("Headline".to_string()),
            body: Some(raw_document.to_string()),
            byline: None,
            timestamp_text: None,
            has_parse_errors: false,
        }
    }
}

/// Index source with a fixed answer; `None` simulates an unavailable page.
#[derive(Debug, Clone, Default)]
pub struct FixedIndex {
    urls: Option<BTreeSet<String>>,
}

impl FixedIndex {
    pub fn new<I: IntoIterator<Item = &'static str>>(urls: I) -> Self {
        Self {
            urls: Some(urls.into_iter().map(String::from).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { urls: None }
    }
}

impl IndexSource for FixedIndex {
    async fn candidate_urls(&self, index_url: &str) -> Result<BTreeSet<String>> {
        self.urls
            .clone()
            .ok_or_else(|| Error::Index(format!("{index_url}: http:503")))
    }
}

/// Keeps every alert for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerts {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingAlerts {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    async fn notify(&self, message: &str) {
        self.sent.lock().unwrap().push(message.to_string());
    }
}
