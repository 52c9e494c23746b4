//! Core types for the News Insight aggregator
//!
//! This crate defines the shared data structures used across the workspace,
//! including raw feed items, synthesized news clusters, and model bookkeeping.

pub mod error;
pub mod model;
pub mod news;

pub use error::InsightError;
pub use model::{ModelCandidate, ModelStatus, UsageSnapshot};
pub use news::{
    AnalysisData, AnalysisResponse, ClusterRecord, FeedItem, ERROR_TOPICS, SENTINEL_TITLES,
};
