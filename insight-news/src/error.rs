//! Failures while reading feeds and scraping articles

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsError {
    /// Source could not be reached
    #[error("Could not reach news source: {0}")]
    RequestFailed(String),

    /// Feed or article page answered with a non-success status
    #[error("News source answered with status {status}: {message}")]
    SourceStatus { status: u16, message: String },

    /// Body was neither a readable RSS nor Atom feed
    #[error("Unreadable feed: {0}")]
    ParseError(String),

    /// Article page held no extractable text
    #[error("Could not extract article text: {0}")]
    ScrapeFailed(String),

    /// Unknown category or unusable client settings
    #[error("Unknown or misconfigured source: {0}")]
    InvalidConfig(String),
}
