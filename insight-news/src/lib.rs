//! News collaborators for the aggregator
//!
//! This crate provides:
//! - RSS/Atom feeds: categorized BBC/CNN feeds behind the [`SourceFetcher`] trait
//! - HTML scraping: plain paragraph extraction behind the [`ArticleScraper`] trait

pub mod error;
pub mod html_scraper;
pub mod rss_client;
pub mod source;
pub mod types;

pub use error::NewsError;
pub use html_scraper::HtmlScraper;
pub use rss_client::{get_category_feeds, CategoryFeed, RssClient};
pub use source::{ArticleScraper, SourceFetcher};
pub use types::ScrapedArticle;
