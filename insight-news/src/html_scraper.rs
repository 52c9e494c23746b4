//! Plain HTML article scraper
//!
//! Collects paragraph text from an article page. No readability heuristics:
//! the body is every `<p>` outside of navigation chrome, truncated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::error::NewsError;
use crate::source::ArticleScraper;
use crate::types::ScrapedArticle;

/// Upper bound on scraped body length, in characters
const MAX_BODY_CHARS: usize = 15_000;

/// Scraper that fetches a page and keeps its paragraph text
#[derive(Debug, Clone)]
pub struct HtmlScraper {
    client: Client,
}

impl HtmlScraper {
    pub fn new() -> Result<Self, NewsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .map_err(|e| NewsError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleScraper for HtmlScraper {
    #[instrument(skip(self))]
    async fn scrape_article(&self, url: &str) -> Result<ScrapedArticle, NewsError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NewsError::SourceStatus {
                status: response.status().as_u16(),
                message: format!("Failed to fetch {}", url),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| NewsError::ScrapeFailed(e.to_string()))?;

        let article = extract_article(&html);
        debug!("Scraped {} chars from {}", article.body.len(), url);
        Ok(article)
    }
}

/// Extract title, paragraph text and OG image from a page
pub fn extract_article(html: &str) -> ScrapedArticle {
    let document = Html::parse_document(html);

    let title = select_first_text(&document, "title");
    let image_url = Selector::parse(r#"meta[property="og:image"]"#)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .find_map(|el| el.value().attr("content").map(str::to_string))
        });

    let mut body = String::new();
    if let Ok(paragraphs) = Selector::parse("p") {
        for p in document.select(&paragraphs) {
            // Skip paragraphs inside navigation/footer chrome
            let in_chrome = p.ancestors().any(|node| {
                node.value()
                    .as_element()
                    .map(|el| matches!(el.name(), "nav" | "footer" | "script" | "style"))
                    .unwrap_or(false)
            });
            if in_chrome {
                continue;
            }

            let text = p.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                body.push_str(&text);
                body.push(' ');
            }
        }
    }

    let body = body.trim();
    let body = match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    };

    ScrapedArticle {
        title,
        body,
        image_url,
    }
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text = document
        .select(&sel)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}
