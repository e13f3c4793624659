//! Error type shared by every stage of a sorting run
//!
//! Every variant is fatal. Outcomes that end a run without failing
//! (nothing to move, operator declined) are [`crate::pipeline::RunOutcome`]
//! values instead.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, SorterError>;

/// Fatal errors that abort a sorting run
#[derive(Debug, Error)]
pub enum SorterError {
    /// Missing or invalid environment value, rule file or pattern
    #[error("configuration error: {0}")]
    Config(String),

    /// The console answered with a non-success status
    #[error("failed attempt to {action}. Status code is {status}\nResponse:\n{body}")]
    Api {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// Connection, timeout or decoding failure talking to the console
    #[error("failed attempt to {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Remote site list and configured groups disagree
    #[error("{0}")]
    SiteMismatch(String),

    /// Log sink or prompt I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SorterError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
