//! Fakes for the collaborator traits

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use insight_core::FeedItem;
use insight_gemini::{Generation, GenerationError, TextGenerator};
use insight_news::{NewsError, SourceFetcher};
use parking_lot::Mutex;
use tokio::time::Instant;

enum Scripted {
    Reply(Generation, Option<Duration>),
    Transport,
}

/// Text generator replaying queued replies per model
pub(crate) struct ScriptedGenerator {
    configured: bool,
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    otherwise: Generation,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedGenerator {
    /// Unscripted models answer 503
    pub(crate) fn new() -> Self {
        Self {
            configured: true,
            script: Mutex::new(HashMap::new()),
            otherwise: Generation::status(503, "unavailable"),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every model answers with `text`
    pub(crate) fn always(text: &str) -> Self {
        Self {
            otherwise: Generation::ok(text),
            ..Self::new()
        }
    }

    pub(crate) fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn push(&self, model: &str, reply: Generation) -> &Self {
        self.script
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(Scripted::Reply(reply, None));
        self
    }

    /// Queue a reply that takes `delay` instead of the default latency
    pub(crate) fn push_delayed(&self, model: &str, reply: Generation, delay: Duration) -> &Self {
        self.script
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(Scripted::Reply(reply, Some(delay)));
        self
    }

    pub(crate) fn push_transport_error(&self, model: &str) -> &Self {
        self.script
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(Scripted::Transport);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate_content(
        &self,
        model: &str,
        _prompt: &str,
    ) -> Result<Generation, GenerationError> {
        self.calls.lock().push((model.to_string(), Instant::now()));
        let next = self
            .script
            .lock()
            .get_mut(model)
            .and_then(|queue| queue.pop_front());

        let delay = match &next {
            Some(Scripted::Reply(_, Some(delay))) => *delay,
            _ => self.latency,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match next {
            Some(Scripted::Reply(reply, _)) => Ok(reply),
            Some(Scripted::Transport) => Err(GenerationError::Transport("connection reset".into())),
            None => Ok(self.otherwise.clone()),
        }
    }
}

/// Source fetcher serving fixed items per category
#[derive(Default)]
pub(crate) struct StaticFetcher {
    items: Mutex<HashMap<String, Vec<FeedItem>>>,
    failing: Mutex<bool>,
    fetches: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub(crate) fn with(category: &str, items: Vec<FeedItem>) -> Self {
        let fetcher = Self::default();
        fetcher.set(category, items);
        fetcher
    }

    pub(crate) fn set(&self, category: &str, items: Vec<FeedItem>) {
        self.items.lock().insert(category.to_string(), items);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub(crate) fn fetch_count(&self, category: &str) -> usize {
        self.fetches.lock().iter().filter(|c| *c == category).count()
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch_items(&self, source_id: &str) -> Result<Vec<FeedItem>, NewsError> {
        self.fetches.lock().push(source_id.to_string());
        if *self.failing.lock() {
            return Err(NewsError::RequestFailed("feed down".into()));
        }
        Ok(self
            .items
            .lock()
            .get(source_id)
            .cloned()
            .unwrap_or_default())
    }

    fn source_ids(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }
}

/// A model reply in the single-snippet analysis shape
pub(crate) fn snippet_json(topic: &str) -> String {
    format!(
        r#"{{"topic":"{}","summary":"s","economic_impact":"e","global_impact":"g","impact_rating":"7","what_next":"w"}}"#,
        topic
    )
}
