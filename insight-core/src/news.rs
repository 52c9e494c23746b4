//! News data structures for feed aggregation and AI synthesis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Topics reserved for error-flagged cluster records
pub const ERROR_TOPICS: &[&str] = &["Analysis Error", "System Error", "API Key Missing", "No Content"];

/// Titles a source fetcher emits instead of failing
pub const SENTINEL_TITLES: &[&str] = &["no news found", "system error", "no feed data", "fetch error"];

/// A raw item pulled from a news feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Article title
    pub title: String,
    /// Article URL
    pub link: String,
    /// Brief summary/excerpt (HTML stripped)
    #[serde(default)]
    pub summary: String,
    /// Publication date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Article thumbnail/image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FeedItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            summary: String::new(),
            published_at: None,
            image_url: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Placeholder item returned by fetchers that swallow their own errors
    pub fn sentinel(title: &str, message: impl Into<String>) -> Self {
        Self::new(title, "").with_summary(message)
    }

    /// Whether this item is an error/empty placeholder rather than an article
    pub fn is_sentinel(&self) -> bool {
        let title = self.title.trim().to_lowercase();
        SENTINEL_TITLES.iter().any(|s| title.starts_with(s))
    }
}

/// A synthesized summary of one news event, possibly spanning several articles
///
/// Field names are part of the persisted cache format and must stay snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterRecord {
    pub topic: String,
    pub summary: String,
    pub economic_impact: String,
    pub global_impact: String,
    /// Rating 1-10, kept as text; models emit both `"8"` and `8`
    #[serde(deserialize_with = "string_or_number")]
    pub impact_rating: String,
    pub what_next: String,
    pub related_links: Vec<String>,
    pub model_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ClusterRecord {
    /// Build an error-flagged record; `topic` should be one of [`ERROR_TOPICS`]
    pub fn error(topic: &str, message: impl Into<String>, model_used: &str) -> Self {
        Self {
            topic: topic.to_string(),
            summary: message.into(),
            economic_impact: "N/A".to_string(),
            global_impact: "N/A".to_string(),
            impact_rating: "0".to_string(),
            what_next: "N/A".to_string(),
            related_links: Vec::new(),
            model_used: model_used.to_string(),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        ERROR_TOPICS.contains(&self.topic.as_str())
    }

    /// Identity used for deduplication: topic plus the first related link
    pub fn dedup_key(&self) -> String {
        let first_link = self.related_links.first().map(String::as_str).unwrap_or("");
        format!("{}{}", self.topic, first_link)
    }
}

/// Full-article analysis produced by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisData {
    pub summary: String,
    pub economic_impact: String,
    pub global_impact: String,
    pub impact_rating: i32,
    pub urgency: String,
}

impl AnalysisData {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            summary: message.into(),
            economic_impact: "N/A".to_string(),
            global_impact: "N/A".to_string(),
            impact_rating: 0,
            urgency: "Unknown".to_string(),
        }
    }

    /// Whether this was produced by [`AnalysisData::error`]
    pub fn is_error(&self) -> bool {
        self.impact_rating == 0 && self.economic_impact == "N/A" && self.global_impact == "N/A"
    }
}

/// Analysis plus the scraped text it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: AnalysisData,
    pub full_text: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
