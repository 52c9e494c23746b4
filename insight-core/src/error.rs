//! Error types for the aggregator

use thiserror::Error;

/// Failures shared by the client crates
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl InsightError {
    pub fn network(msg: impl Into<String>) -> Self {
        InsightError::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        InsightError::Parse(msg.into())
    }
}
