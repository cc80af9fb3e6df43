//! Error types for the monitor.
//!
//! Transient fetch failures never show up here: the HTTP retriever reports
//! them as [`crate::http::Retrieval`] values so a cycle can record them and
//! move on. Everything in this enum either aborts a phase (index failures)
//! or the whole process (persistence failures), see [`Error::is_fatal`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Storage unavailable, constraint violation, or any other sqlx failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} is already tracked")]
    AlreadyTracked(String),

    #[error("{0} is not tracked")]
    NotTracked(String),

    #[error("invalid tier {0} (expected 0-6)")]
    InvalidTier(i64),

    /// A stored row that cannot be decoded back into a model type
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file invalid: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The index page could not be retrieved or parsed
    #[error("index page unavailable: {0}")]
    Index(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Persistence failures leave tier/fetch/snapshot state possibly half
    /// applied, so the process must stop instead of starting another cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::AlreadyTracked(_)
                | Error::NotTracked(_)
                | Error::InvalidTier(_)
                | Error::CorruptRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
