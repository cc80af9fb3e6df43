//! Command-line interface definitions for the news monitor.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Global options can also be provided via environment variables.

use crate::config::MonitorConfig;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the news monitor.
///
/// # Examples
///
/// ```sh
/// # Monitor forever with the defaults
/// awful_news_monitor run
///
/// # One cycle against a specific database, report printed as JSON
/// awful_news_monitor --database ./news.sqlite3 once
///
/// # Stop polling an article
/// awful_news_monitor -c monitor.yaml freeze https://www.bbc.co.uk/news/articles/c1
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "NEWS_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Telegram bot token; setting it together with a chat id enables Telegram alerts
    #[arg(long, global = true, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram chat to send alerts to
    #[arg(long, global = true, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a cycle on every tick until interrupted
    Run,
    /// Run a single cycle and print its report as JSON
    Once,
    /// Exclude an article from all further polling (tier 0)
    Freeze { url: String },
    /// Print every stored version and fetch attempt of an article as JSON, oldest first
    History { url: String },
    /// Send the weekly report now
    Report,
}

impl Cli {
    /// The config file (or defaults) with command-line overrides applied.
    pub fn load_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(db) = &self.database {
            config.database_path = db.clone();
        }
        if let Some(token) = &self.telegram_token {
            config.telegram.token = Some(token.clone());
        }
        if let Some(chat_id) = &self.telegram_chat_id {
            config.telegram.chat_id = Some(chat_id.clone());
        }
        if self.telegram_token.is_some() && self.telegram_chat_id.is_some() {
            config.telegram.enabled = true;
        }
    }
}
