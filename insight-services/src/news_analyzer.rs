//! Prompt building and response parsing around the model invoker
//!
//! Turns feed items and article text into [`ClusterRecord`]s and
//! [`AnalysisData`]. Malformed model output never surfaces as an error:
//! it becomes an error-flagged record instead.

use std::sync::Arc;

use insight_core::{AnalysisData, ClusterRecord, FeedItem};
use insight_gemini::extract_json;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::invoker::{InvokeError, ModelInvoker};

/// Prompt input beyond this many characters is cut off
const MAX_CLUSTER_INPUT_CHARS: usize = 30_000;

pub struct NewsAnalyzer {
    invoker: Arc<ModelInvoker>,
}

impl NewsAnalyzer {
    pub fn new(invoker: Arc<ModelInvoker>) -> Self {
        Self { invoker }
    }

    /// Analyze a single headline and snippet
    #[instrument(skip(self, snippet))]
    pub async fn analyze_snippet(
        &self,
        title: &str,
        snippet: &str,
        lang: &str,
        preferred_model: Option<&str>,
    ) -> Result<ClusterRecord, InvokeError> {
        let prompt = format!(
            r#"Analyze this news snippet. FOCUS ON LATEST INFORMATION.
Title: {title}
Content: {snippet}

1. TRANSLATION: Translate "topic", "summary", "economic_impact", "global_impact", and "what_next" into {language}.
2. ANALYSIS: Provide synthesized summary, economic impact, global impact, rating (1-10), and prediction.

Return ONLY JSON:
{{"topic":"...","summary":"...","economic_impact":"...","global_impact":"...","impact_rating":"8","what_next":"..."}}"#,
            language = target_language(lang),
        );

        let invocation = self.invoker.invoke(&prompt, preferred_model).await?;

        let record = extract_json(&invocation.text)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<ClusterRecord>(&json).map_err(|e| e.to_string()));

        Ok(match record {
            Ok(mut record) => {
                record.model_used = invocation.model_used;
                record
            }
            Err(e) => {
                warn!("Unparseable snippet analysis from {}: {}", invocation.model_used, e);
                ClusterRecord::error("Analysis Error", e, &invocation.model_used)
            }
        })
    }

    /// Group several feed items into clusters of the same event
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn cluster_items(
        &self,
        items: &[FeedItem],
        lang: &str,
        preferred_model: Option<&str>,
    ) -> Result<Vec<ClusterRecord>, InvokeError> {
        let valid: Vec<&FeedItem> = items.iter().filter(|item| !item.is_sentinel()).collect();
        if valid.is_empty() {
            return Ok(vec![ClusterRecord::error(
                "No Content",
                "No valid articles found.",
                "None",
            )]);
        }

        let mut input = String::new();
        for item in &valid {
            input.push_str(&format!(
                "- Title: {}\nLink: {}\nSnippet: {}\n\n",
                item.title, item.link, item.summary
            ));
        }
        if let Some((idx, _)) = input.char_indices().nth(MAX_CLUSTER_INPUT_CHARS) {
            input.truncate(idx);
            input.push_str("...[TRUNCATED]");
        }

        let prompt = format!(
            r#"Expert Analyst Task: Group articles about SAME event. Synthesize unified summary. LATEST INFO FIRST.
2. TRANSLATE: "topic", "summary", "economic_impact", "global_impact", "what_next" into {language}.
Input:
{input}
Output Schema: [{{"topic":"...","summary":"...","economic_impact":"...","global_impact":"...","impact_rating":"8","what_next":"...","related_links":["url1"]}}]"#,
            language = target_language(lang),
        );

        let invocation = self.invoker.invoke(&prompt, preferred_model).await?;

        let clusters = extract_json(&invocation.text)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                serde_json::from_str::<Vec<ClusterRecord>>(&json).map_err(|e| e.to_string())
            });

        let mut clusters = match clusters {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!("Unparseable cluster response from {}: {}", invocation.model_used, e);
                return Ok(vec![ClusterRecord::error(
                    "Analysis Error",
                    e,
                    &invocation.model_used,
                )]);
            }
        };

        for cluster in &mut clusters {
            cluster.model_used = invocation.model_used.clone();
            attach_source_details(cluster, &valid);
        }
        debug!("Model {} produced {} clusters", invocation.model_used, clusters.len());
        Ok(clusters)
    }

    /// Analyze full article text
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn analyze_text(&self, text: &str) -> AnalysisData {
        let prompt = format!(
            "Analyze the following news text. Focus on current developments.\n\n{}\n\nReturn JSON: {{\"summary\":\"...\",\"economic_impact\":\"...\",\"global_impact\":\"...\",\"impact_rating\":5,\"urgency\":\"Medium\"}}",
            text
        );

        let invocation = match self.invoker.invoke(&prompt, None).await {
            Ok(invocation) => invocation,
            Err(InvokeError::ConfigMissing) => return AnalysisData::error("API Key Missing"),
            Err(e) => return AnalysisData::error(format!("Analysis failed: {}", e)),
        };

        let parsed = extract_json(&invocation.text)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<RawAnalysis>(&json).map_err(|e| e.to_string()));

        match parsed {
            Ok(raw) => raw.into(),
            Err(e) => {
                warn!("Unparseable article analysis: {}", e);
                AnalysisData::error(format!("Analysis failed: {}", e))
            }
        }
    }
}

fn target_language(lang: &str) -> &str {
    if lang.eq_ignore_ascii_case("chinese") {
        "Simplified Chinese (zh-CN)"
    } else {
        lang
    }
}

/// Copy image and date from the feed item a cluster links to first
fn attach_source_details(cluster: &mut ClusterRecord, items: &[&FeedItem]) {
    let Some(first_link) = cluster.related_links.first() else {
        return;
    };
    let Some(item) = items.iter().find(|item| &item.link == first_link) else {
        return;
    };

    if cluster.image_url.is_none() {
        cluster.image_url = item.image_url.clone();
    }
    if cluster.published_date.is_none() {
        cluster.published_date = item.published_at.map(|d| d.to_rfc3339());
    }
}

/// Article analysis as the model returns it; the rating may be quoted
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    summary: String,
    economic_impact: String,
    global_impact: String,
    impact_rating: serde_json::Value,
    urgency: String,
}

impl From<RawAnalysis> for AnalysisData {
    fn from(raw: RawAnalysis) -> Self {
        let impact_rating = match &raw.impact_rating {
            serde_json::Value::Number(n) => n.as_f64().map(|f| f.round() as i32),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i32),
            _ => None,
        }
        .unwrap_or(0);

        AnalysisData {
            summary: raw.summary,
            economic_impact: raw.economic_impact,
            global_impact: raw.global_impact,
            impact_rating,
            urgency: raw.urgency,
        }
    }
}
