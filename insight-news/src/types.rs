//! Types returned by the news collaborators

use serde::Serialize;

/// Scraped article content
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapedArticle {
    /// Page title
    pub title: Option<String>,
    /// Concatenated paragraph text
    pub body: String,
    /// OG image URL
    pub image_url: Option<String>,
}
