//! YAML configuration for the monitor.
//!
//! Every key is optional; a missing file section falls back to the defaults
//! below, which reproduce the production settings (15 minute cycles, 5 second
//! politeness delay, weekly report on Saturday at 10:00).

use crate::error::{Error, Result};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyReportConfig {
    pub enabled: bool,
    pub weekday: Weekday,
    /// Time of day, UTC.
    pub time: NaiveTime,
}

impl Default for WeeklyReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: Weekday::Sat,
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub database_path: PathBuf,
    /// Page listing the articles to discover.
    pub index_url: String,
    /// Retrieved before each cycle to tell an offline host from a failing source.
    pub probe_url: String,
    pub user_agent: String,
    pub cycle_interval_secs: u64,
    pub politeness_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    pub store_raw_content: bool,
    pub telegram: TelegramConfig,
    pub weekly_report: WeeklyReportConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db/news_monitor.sqlite3"),
            index_url: "https://www.bbc.co.uk/news".to_string(),
            probe_url: "https://www.bbc.co.uk".to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            cycle_interval_secs: 15 * 60,
            politeness_delay_ms: 5_000,
            request_timeout_secs: 10,
            max_concurrent_fetches: 1,
            store_raw_content: true,
            telegram: TelegramConfig::default(),
            weekly_report: WeeklyReportConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Read and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval_secs == 0 {
            return Err(Error::Config("cycle_interval_secs must be greater than zero".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config("max_concurrent_fetches must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = MonitorConfig::from_yaml("{}").unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.cycle_interval(), Duration::from_secs(900));
        assert_eq!(config.politeness_delay(), Duration::from_secs(5));
        assert_eq!(config.weekly_report.weekday, Weekday::Sat);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let config = MonitorConfig::from_yaml(
            r#"
database_path: /var/lib/monitor/news.sqlite3
max_concurrent_fetches: 4
telegram:
  enabled: true
  chat_id: "-100123"
weekly_report:
  weekday: Mon
  time: "07:30:00"
"#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/monitor/news.sqlite3"));
        assert_eq!(config.max_concurrent_fetches, 4);
        assert!(config.telegram.enabled);
        assert_eq!(config.telegram.token, None);
        assert_eq!(config.weekly_report.weekday, Weekday::Mon);
        assert_eq!(config.weekly_report.time, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(matches!(
            MonitorConfig::from_yaml("cycle_interval_secs: 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MonitorConfig::from_yaml("max_concurrent_fetches: 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        assert!(matches!(MonitorConfig::from_yaml("cycle_interval_secs: soon"), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "politeness_delay_ms: 250").unwrap();
        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.politeness_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            MonitorConfig::load(Path::new("/nonexistent/monitor.yaml")),
            Err(Error::Io(_))
        ));
    }
}
