//! Categorized RSS/Atom source fetcher
//!
//! Fetches and parses RSS/Atom feeds, one feed per news category.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use insight_core::FeedItem;

use crate::error::NewsError;
use crate::source::SourceFetcher;

/// Default number of items kept per feed (top of the feed)
const DEFAULT_MAX_ITEMS: usize = 20;

/// RSS feed for a single category
#[derive(Debug, Clone)]
pub struct CategoryFeed {
    /// Category id used as the source id (e.g., "world")
    pub category: String,
    /// RSS feed URL
    pub url: String,
}

impl CategoryFeed {
    pub fn new(category: &str, url: &str) -> Self {
        Self {
            category: category.to_string(),
            url: url.to_string(),
        }
    }
}

/// Curated category feeds
pub fn get_category_feeds() -> Vec<CategoryFeed> {
    vec![
        // BBC front page
        CategoryFeed::new("top", "https://feeds.bbci.co.uk/news/rss.xml"),
        CategoryFeed::new("world", "https://feeds.bbci.co.uk/news/world/rss.xml"),
        CategoryFeed::new("business", "https://feeds.bbci.co.uk/news/business/rss.xml"),
        CategoryFeed::new("technology", "https://feeds.bbci.co.uk/news/technology/rss.xml"),
        CategoryFeed::new(
            "science",
            "https://feeds.bbci.co.uk/news/science_and_environment/rss.xml",
        ),
        CategoryFeed::new("health", "https://feeds.bbci.co.uk/news/health/rss.xml"),
        CategoryFeed::new(
            "entertainment",
            "https://feeds.bbci.co.uk/news/entertainment_and_arts/rss.xml",
        ),
        CategoryFeed::new("politics", "https://feeds.bbci.co.uk/news/politics/rss.xml"),
        CategoryFeed::new("sport", "https://feeds.bbci.co.uk/sport/rss.xml"),
        // CNN top stories
        CategoryFeed::new("cnn", "http://rss.cnn.com/rss/edition.rss"),
    ]
}

/// RSS feed client
pub struct RssClient {
    client: Client,
    feeds: Vec<CategoryFeed>,
    max_items: usize,
}

impl RssClient {
    /// Create a new RSS client with the curated category feeds
    pub fn new() -> Self {
        Self::with_feeds(get_category_feeds())
    }

    /// Create with custom feeds
    pub fn with_feeds(feeds: Vec<CategoryFeed>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            feeds,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Fetch a category feed, preserving feed order
    pub async fn fetch_category(&self, category: &str) -> Result<Vec<FeedItem>, NewsError> {
        let feed = self
            .feeds
            .iter()
            .find(|f| f.category.eq_ignore_ascii_case(category))
            .ok_or_else(|| NewsError::InvalidConfig(format!("Unknown category: {}", category)))?;

        let items = self.fetch_feed(feed).await?;
        info!("Fetched {} items for category {}", items.len(), feed.category);
        Ok(items)
    }

    /// Fetch a single RSS feed
    async fn fetch_feed(&self, feed: &CategoryFeed) -> Result<Vec<FeedItem>, NewsError> {
        let response = self
            .client
            .get(&feed.url)
            .header("User-Agent", "NewsInsight/1.0")
            .send()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NewsError::SourceStatus {
                status: response.status().as_u16(),
                message: format!("Failed to fetch {}", feed.url),
            });
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        let mut items = parse_feed(&content).map_err(|e| {
            warn!("Failed to parse feed {}: {}", feed.url, e);
            e
        })?;
        items.truncate(self.max_items);
        debug!("Parsed {} items from {}", items.len(), feed.url);
        Ok(items)
    }
}

impl Default for RssClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for RssClient {
    async fn fetch_items(&self, source_id: &str) -> Result<Vec<FeedItem>, NewsError> {
        self.fetch_category(source_id).await
    }

    fn source_ids(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.category.clone()).collect()
    }
}

/// Parse raw feed bytes as RSS first, then Atom
pub fn parse_feed(content: &[u8]) -> Result<Vec<FeedItem>, NewsError> {
    if let Ok(channel) = rss::Channel::read_from(content) {
        return Ok(parse_rss_channel(&channel));
    }

    if let Ok(atom_feed) = atom_syndication::Feed::read_from(content) {
        return Ok(parse_atom_feed(&atom_feed));
    }

    Err(NewsError::ParseError("Content is neither RSS nor Atom".to_string()))
}

/// Parse RSS channel into FeedItems
fn parse_rss_channel(channel: &rss::Channel) -> Vec<FeedItem> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let title = item.title()?.trim().to_string();
            let link = item.link()?.trim().to_string();

            let published_at = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc))
                .or_else(|| extract_date_from_url(&link));

            // Get description HTML (before stripping)
            let description_html = item.description().unwrap_or_default();
            let summary = strip_html(description_html);

            // 1. Enclosure with image mime type
            // 2. media:thumbnail / media:content
            // 3. <img> inside the description
            let image_url = item
                .enclosure()
                .filter(|e| e.mime_type().starts_with("image/"))
                .map(|e| e.url().to_string())
                .or_else(|| extract_media_content(item))
                .or_else(|| extract_image_from_html(description_html));

            Some(FeedItem {
                title,
                link,
                summary,
                published_at,
                image_url,
            })
        })
        .collect()
}

/// Parse Atom feed into FeedItems
fn parse_atom_feed(atom_feed: &atom_syndication::Feed) -> Vec<FeedItem> {
    atom_feed
        .entries()
        .iter()
        .filter_map(|entry| {
            let link = entry.links().first().map(|l| l.href().to_string())?;
            if link.is_empty() {
                return None;
            }

            let published_at = entry
                .published()
                .map(|d| d.with_timezone(&Utc))
                .or_else(|| Some(entry.updated().with_timezone(&Utc)));

            let summary_html = entry.summary().map(|s| s.as_str()).unwrap_or_default();
            let content_html = entry.content().and_then(|c| c.value()).unwrap_or_default();

            let summary = if !summary_html.is_empty() {
                strip_html(summary_html)
            } else {
                strip_html(content_html)
            };

            let image_url = extract_image_from_html(content_html)
                .or_else(|| extract_image_from_html(summary_html));

            Some(FeedItem {
                title: entry.title().as_str().trim().to_string(),
                link,
                summary,
                published_at,
                image_url,
            })
        })
        .collect()
}

/// Extract image URL from HTML content (finds first <img src="...">)
fn extract_image_from_html(html: &str) -> Option<String> {
    let img_pattern = regex::Regex::new(r#"<img[^>]+src=["']([^"']+)["']"#).ok()?;
    let url = img_pattern.captures(html)?.get(1)?.as_str().to_string();
    // Skip tiny tracking pixels and icons
    if url.contains("1x1") || url.contains("pixel") || url.contains("spacer") {
        return None;
    }
    Some(url)
}

/// Extract image from RSS media:thumbnail or media:content extensions
fn extract_media_content(item: &rss::Item) -> Option<String> {
    let media = item.extensions().get("media")?;

    // BBC ships media:thumbnail only
    if let Some(thumbnail) = media
        .get("thumbnail")
        .and_then(|list| list.iter().find_map(|t| t.attrs().get("url")))
    {
        return Some(thumbnail.clone());
    }

    media.get("content").and_then(|list| {
        list.iter().find_map(|content| {
            let url = content.attrs().get("url")?;
            let medium = content.attrs().get("medium").map(|s| s.as_str());
            let mime = content.attrs().get("type").map(|s| s.as_str());
            let is_image = medium == Some("image")
                || mime.map(|m| m.starts_with("image/")).unwrap_or(false);
            is_image.then(|| url.clone())
        })
    })
}

/// Strip HTML tags from text
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    // Clean up whitespace and HTML entities
    result
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract date from URL patterns like /2025/12/09/
fn extract_date_from_url(url: &str) -> Option<DateTime<Utc>> {
    let slash_pattern = regex::Regex::new(r"/(\d{4})/(\d{1,2})/(\d{1,2})/").ok()?;
    let caps = slash_pattern.captures(url)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;

    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(12, 0, 0)?,
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>BBC News - World</title>
    <link>https://www.bbc.co.uk/news/world</link>
    <description>World</description>
    <item>
      <title>Central bank holds rates</title>
      <description><![CDATA[<p>Rates stay at <b>4%</b> &amp; markets react</p>]]></description>
      <link>https://www.bbc.co.uk/news/articles/abc?at_medium=RSS</link>
      <pubDate>Mon, 13 Oct 2025 10:00:00 GMT</pubDate>
      <media:thumbnail width="240" height="135" url="https://ichef.bbci.co.uk/a.jpg"/>
    </item>
    <item>
      <title>Storm hits coast</title>
      <description>Heavy rain</description>
      <link>https://www.bbc.co.uk/news/articles/def</link>
    </item>
    <item>
      <description>No title, skipped</description>
      <link>https://www.bbc.co.uk/news/articles/ghi</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_strip_html() {
        let html = "<p>Hello <b>world</b>!</p>";
        assert_eq!(strip_html(html), "Hello world!");
    }

    #[test]
    fn test_parse_rss_keeps_feed_order() {
        let items = parse_feed(RSS_SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Central bank holds rates");
        assert_eq!(items[0].summary, "Rates stay at 4% & markets react");
        assert_eq!(
            items[0].image_url.as_deref(),
            Some("https://ichef.bbci.co.uk/a.jpg")
        );
        assert!(items[0].published_at.is_some());
        assert_eq!(items[1].link, "https://www.bbc.co.uk/news/articles/def");
        assert!(items[1].published_at.is_none());
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = parse_feed(b"not a feed").unwrap_err();
        assert!(matches!(err, NewsError::ParseError(_)));
        assert_eq!(
            err.to_string(),
            "Unreadable feed: Content is neither RSS nor Atom"
        );
    }

    #[test]
    fn test_extract_date_from_url() {
        let date = extract_date_from_url("https://edition.cnn.com/2025/12/09/world/story").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2025-12-09");
        assert!(extract_date_from_url("https://bbc.co.uk/news/x").is_none());
    }

    #[test]
    fn test_category_feeds() {
        let feeds = get_category_feeds();
        assert!(feeds.iter().any(|f| f.category == "world"));
        let client = RssClient::with_feeds(feeds);
        assert!(client.source_ids().contains(&"sport".to_string()));
    }
}
