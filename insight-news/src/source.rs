//! Collaborator traits consumed by the scheduler and API

use async_trait::async_trait;
use insight_core::FeedItem;

use crate::error::NewsError;
use crate::types::ScrapedArticle;

/// Supplies raw items for a named source/category
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch items in feed order. Implementations may return an empty list or a
    /// sentinel item (see [`FeedItem::is_sentinel`]) instead of an error.
    async fn fetch_items(&self, source_id: &str) -> Result<Vec<FeedItem>, NewsError>;

    /// Source ids this fetcher knows about
    fn source_ids(&self) -> Vec<String>;
}

/// Extracts readable text from an article page
#[async_trait]
pub trait ArticleScraper: Send + Sync {
    async fn scrape_article(&self, url: &str) -> Result<ScrapedArticle, NewsError>;
}
