//! Operator alerts.
//!
//! Alerts are best effort: a sink that cannot deliver logs the failure and
//! returns, so a broken alert channel never stalls or aborts a cycle.
//! Network sinks deliver in the background; call [`AlertSink::flush`] before
//! the process exits.

use crate::config::TelegramConfig;
use crate::error::Result;
use crate::models::FetchOutcome;
use crate::utils::{escape_html, truncate_for_log};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Somewhere to send operator-facing messages. Messages may contain
/// Telegram-style HTML (`<b>`, `<i>`).
pub trait AlertSink {
    /// Queue or deliver `message`. Must return promptly.
    async fn notify(&self, message: &str);

    /// Wait for every queued delivery to finish.
    async fn flush(&self) {}
}

/// Message for a failed article retrieval.
pub fn request_error_message(url: &str, attempted_at: DateTime<Utc>, outcome: FetchOutcome) -> String {
    format!(
        "<b>Request error</b>\n{}\nat {}\n<i>{}</i>",
        escape_html(url),
        attempted_at.format("%Y-%m-%d %H:%M:%S UTC"),
        outcome
    )
}

/// Message sent right before the process stops on a persistence failure.
pub fn fatal_message(error: &str) -> String {
    format!(
        "<b>Monitor stopped</b>\nFatal error, shutting down:\n<i>{}</i>",
        escape_html(&truncate_for_log(error, 500))
    )
}

/// Writes alerts to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    async fn notify(&self, message: &str) {
        warn!(alert = %message, "Alert");
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Posts alerts to a Telegram chat through the Bot API.
///
/// Each message is sent from its own task, so a slow or unreachable API
/// never holds up the caller.
#[derive(Debug, Clone)]
pub struct TelegramAlertSink {
    client: Client,
    endpoint: Arc<str>,
    chat_id: Arc<str>,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl TelegramAlertSink {
    pub fn new(token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self::with_client(client, TELEGRAM_API_BASE, token, chat_id))
    }

    pub fn with_client(client: Client, api_base: &str, token: &str, chat_id: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token).into(),
            chat_id: chat_id.into(),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }
}

async fn send_message(client: Client, endpoint: Arc<str>, chat_id: Arc<str>, text: String) {
    let payload = SendMessage {
        chat_id: &chat_id,
        text: &text,
        parse_mode: "HTML",
        disable_web_page_preview: true,
    };
    match client.post(&*endpoint).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => info!("Alert delivered"),
        Ok(resp) => warn!(status = resp.status().as_u16(), "Alert rejected by Telegram"),
        // Don't log the endpoint, it carries the bot token
        Err(e) => warn!(error = %e.without_url(), "Alert delivery failed"),
    }
}

impl AlertSink for TelegramAlertSink {
    #[instrument(level = "debug", skip_all)]
    async fn notify(&self, message: &str) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(send_message(
            self.client.clone(),
            self.endpoint.clone(),
            self.chat_id.clone(),
            message.to_string(),
        ));
    }

    async fn flush(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.join_next().await.is_some() {}
    }
}

/// The sink selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredAlertSink {
    Log(LogAlertSink),
    Telegram(TelegramAlertSink),
}

impl ConfiguredAlertSink {
    /// Telegram when enabled with both credentials present, otherwise the log.
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        match (config.enabled, &config.token, &config.chat_id) {
            (true, Some(token), Some(chat_id)) => {
                info!("Alerts go to Telegram");
                Ok(Self::Telegram(TelegramAlertSink::new(token, chat_id)?))
            }
            (true, _, _) => {
                warn!("Telegram enabled without token or chat id; alerts go to the log");
                Ok(Self::Log(LogAlertSink))
            }
            _ => Ok(Self::Log(LogAlertSink)),
        }
    }
}

impl AlertSink for ConfiguredAlertSink {
    async fn notify(&self, message: &str) {
        match self {
            Self::Log(sink) => sink.notify(message).await,
            Self::Telegram(sink) => sink.notify(message).await,
        }
    }

    async fn flush(&self) {
        match self {
            Self::Log(sink) => sink.flush().await,
            Self::Telegram(sink) => sink.flush().await,
        }
    }
}
