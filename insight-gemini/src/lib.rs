//! Text-generation client for the News Insight aggregator
//!
//! Wraps Gemini's `generateContent` endpoint behind the [`TextGenerator`] trait.
//! The client reports raw outcomes (status, text, finish reason); retry and
//! fallback policy belongs to the caller.

pub mod client;
pub mod generator;
pub mod json;
pub mod types;

pub use client::GeminiClient;
pub use generator::{Generation, GenerationError, TextGenerator};
pub use json::extract_json;
