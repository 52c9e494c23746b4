use std::time::Duration;

use async_trait::async_trait;
use insight_core::InsightError;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::generator::{Generation, GenerationError, TextGenerator};
use crate::types::{GenerateContentRequest, GenerateContentResponse};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Placeholder value shipped in sample env files
const PLACEHOLDER_KEY: &str = "your_api_key_here";

/// Gemini `generateContent` client
///
/// Reports what the endpoint returned without interpreting it: non-2xx
/// statuses come back as a [`Generation`] so the caller can classify them.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Result<Self, InsightError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InsightError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.map(|k| k.trim().to_string()),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Build from `GEMINI_API_KEY` and optional `GEMINI_API_BASE`
    ///
    /// A missing key is not an error here; the invoker reports it per request.
    pub fn from_env() -> Result<Self, InsightError> {
        let client = Self::new(std::env::var("GEMINI_API_KEY").ok())?;
        match std::env::var("GEMINI_API_BASE") {
            Ok(base) if !base.trim().is_empty() => Ok(client.with_base_url(base)),
            _ => Ok(client),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str, key: &str) -> String {
        format!("{}/{}:generateContent?key={}", self.base_url, model, key)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn is_configured(&self) -> bool {
        matches!(self.api_key.as_deref(), Some(k) if !k.is_empty() && k != PLACEHOLDER_KEY)
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Generation, GenerationError> {
        let key = self.api_key.as_deref().unwrap_or_default();
        let request = GenerateContentRequest::new(prompt);

        let response = self
            .client
            .post(self.endpoint(model, key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status, "Gemini returned non-success status");
            return Ok(Generation::status(status, body));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let (finish_reason, text) = body.first_text();
        Ok(Generation {
            status,
            text,
            finish_reason,
            error_body: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured() {
        assert!(!GeminiClient::new(None).unwrap().is_configured());
        assert!(!GeminiClient::new(Some("  ".into())).unwrap().is_configured());
        assert!(!GeminiClient::new(Some(PLACEHOLDER_KEY.into()))
            .unwrap()
            .is_configured());
        assert!(GeminiClient::new(Some("abc".into())).unwrap().is_configured());
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new(Some("k".into()))
            .unwrap()
            .with_base_url("http://localhost:9000/models/");
        assert_eq!(
            client.endpoint("gemini-2.5-flash", "k"),
            "http://localhost:9000/models/gemini-2.5-flash:generateContent?key=k"
        );
    }
}
