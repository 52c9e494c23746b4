//! Incremental news scheduler
//!
//! Background driver that analyzes one new feed item per tick, rotating
//! through categories, and folds each result into the aggregation cache.
//! One item per tick keeps the model call rate under the remote quota.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use insight_core::FeedItem;
use insight_news::SourceFetcher;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregation_cache::AggregationCache;
use crate::clock::{Clock, TokioClock};
use crate::config::{env_millis, env_secs, split_list};
use crate::news_analyzer::NewsAnalyzer;

/// Category that is always scheduled
const WORLD_CATEGORY: &str = "world";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Categories to rotate through; `None` uses every fetcher source
    pub categories: Option<Vec<String>>,
    pub tick_interval: Duration,
    /// Age after which a category's raw items are refetched
    pub feed_refresh_interval: Duration,
    /// Wait before retrying a category that has no usable items yet
    pub feed_retry_interval: Duration,
    pub language: String,
    pub model: String,
    /// Prepended to the category to form the cache tab
    pub tab_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            categories: None,
            tick_interval: Duration::from_millis(4500),
            feed_refresh_interval: Duration::from_secs(300),
            feed_retry_interval: Duration::from_secs(60),
            language: "English".to_string(),
            model: "gemini-2.5-flash".to_string(),
            tab_prefix: "bbc-".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            categories: non_empty("SCHEDULER_CATEGORIES").map(|raw| split_list(&raw)),
            tick_interval: env_millis("SCHEDULER_TICK_MS").unwrap_or(defaults.tick_interval),
            feed_refresh_interval: env_secs("SCHEDULER_FEED_REFRESH_SECS")
                .unwrap_or(defaults.feed_refresh_interval),
            feed_retry_interval: env_secs("SCHEDULER_FEED_RETRY_SECS")
                .unwrap_or(defaults.feed_retry_interval),
            language: non_empty("SCHEDULER_LANGUAGE").unwrap_or(defaults.language),
            model: non_empty("SCHEDULER_MODEL").unwrap_or(defaults.model),
            tab_prefix: non_empty("SCHEDULER_TAB_PREFIX").unwrap_or(defaults.tab_prefix),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new item was analyzed and merged
    Processed {
        category: String,
        link: String,
        topic: String,
    },
    /// Every raw item is already cached (or there are none)
    NothingNew { category: String },
    /// The item was consumed for this tick without being recorded
    AnalysisFailed {
        category: String,
        link: String,
        reason: String,
    },
    /// Analysis succeeded but the cache write did not
    CacheFailed {
        category: String,
        link: String,
        reason: String,
    },
    /// Previous tick still running
    Skipped,
    /// No categories configured
    Idle,
}

/// Raw feed cache for one category
#[derive(Debug, Default)]
struct SourceState {
    raw_items: Vec<FeedItem>,
    /// Set on every fetch attempt, whatever its result
    last_attempt: Option<Instant>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    sources: HashMap<String, SourceState>,
    round_robin_index: usize,
}

pub struct IncrementalScheduler {
    fetcher: Arc<dyn SourceFetcher>,
    analyzer: Arc<NewsAnalyzer>,
    cache: Arc<AggregationCache>,
    config: SchedulerConfig,
    categories: Vec<String>,
    clock: Arc<dyn Clock>,
    /// Held for the duration of a tick; doubles as the re-entrancy guard
    state: Mutex<SchedulerState>,
}

/// Strip the query string, lowercase and trim
pub fn normalize_link(link: &str) -> String {
    link.split('?')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

impl IncrementalScheduler {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        analyzer: Arc<NewsAnalyzer>,
        cache: Arc<AggregationCache>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_clock(fetcher, analyzer, cache, config, TokioClock::shared())
    }

    pub fn with_clock(
        fetcher: Arc<dyn SourceFetcher>,
        analyzer: Arc<NewsAnalyzer>,
        cache: Arc<AggregationCache>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut categories = config
            .categories
            .clone()
            .unwrap_or_else(|| fetcher.source_ids());
        if !categories.iter().any(|c| c == WORLD_CATEGORY) {
            categories.push(WORLD_CATEGORY.to_string());
        }
        categories.sort();
        categories.dedup();

        info!("Initializing IncrementalScheduler for categories {:?}", categories);

        Self {
            fetcher,
            analyzer,
            cache,
            config,
            categories,
            clock,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn tab_for(&self, category: &str) -> String {
        format!("{}{}", self.config.tab_prefix, category.to_lowercase())
    }

    /// Spawn the periodic loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Starting IncrementalScheduler with tick interval {:?}",
            self.config.tick_interval
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.tick().await {
                    TickOutcome::Processed { category, topic, .. } => {
                        info!("Scheduler merged \"{}\" into {}", topic, category)
                    }
                    outcome => debug!("Scheduler tick: {:?}", outcome),
                }
            }
        })
    }

    /// Run one scheduling step; never fails
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            return TickOutcome::Skipped;
        };
        if self.categories.is_empty() {
            return TickOutcome::Idle;
        }

        let index = state.round_robin_index % self.categories.len();
        let category = self.categories[index].clone();
        state.round_robin_index = (index + 1) % self.categories.len();

        self.refresh_feed_if_stale(&mut state, &category).await;

        let tab = self.tab_for(&category);
        let raw_items = state
            .sources
            .get(&category)
            .map(|s| s.raw_items.as_slice())
            .unwrap_or_default();
        let Some(item) = self.next_unprocessed(&tab, raw_items) else {
            return TickOutcome::NothingNew { category };
        };

        debug!("Analyzing new item for {}: {}", tab, item.title);
        let analysis = self
            .analyzer
            .analyze_snippet(
                &item.title,
                &item.summary,
                &self.config.language,
                Some(&self.config.model),
            )
            .await;

        let mut record = match analysis {
            Ok(record) if !record.is_error() => record,
            Ok(record) => {
                warn!("Analysis of {} returned {}: {}", item.link, record.topic, record.summary);
                return TickOutcome::AnalysisFailed {
                    category,
                    link: item.link,
                    reason: record.summary,
                };
            }
            Err(e) => {
                warn!("Analysis of {} failed: {}", item.link, e);
                return TickOutcome::AnalysisFailed {
                    category,
                    link: item.link,
                    reason: e.to_string(),
                };
            }
        };

        record.related_links = vec![item.link.clone()];
        record.image_url = item.image_url.clone();
        record.published_date = item.published_at.map(|d| d.to_rfc3339());
        let topic = record.topic.clone();

        match self
            .cache
            .merge(&tab, &self.config.language, &self.config.model, vec![record])
        {
            Ok(merged) => {
                info!("Saved \"{}\" to {} ({} records)", topic, tab, merged.len());
                TickOutcome::Processed {
                    category,
                    link: item.link,
                    topic,
                }
            }
            Err(e) => {
                error!("Cache merge for {} failed: {}", tab, e);
                TickOutcome::CacheFailed {
                    category,
                    link: item.link,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn refresh_feed_if_stale(&self, state: &mut SchedulerState, category: &str) {
        let now = self.clock.now();
        let source = state.sources.entry(category.to_string()).or_default();

        let due = match source.last_attempt {
            None => true,
            Some(attempted) if source.raw_items.is_empty() => {
                now.saturating_duration_since(attempted) >= self.config.feed_retry_interval
            }
            Some(attempted) => {
                now.saturating_duration_since(attempted) > self.config.feed_refresh_interval
            }
        };
        if !due {
            return;
        }

        debug!("Refreshing feed for category {}", category);
        source.last_attempt = Some(now);
        match self.fetcher.fetch_items(category).await {
            Ok(items) if items.iter().any(|item| !item.is_sentinel()) => {
                debug!("Fetched {} items for {}", items.len(), category);
                source.raw_items = items;
            }
            Ok(_) => warn!("Feed for {} returned no usable items, keeping cache", category),
            Err(e) => warn!("Failed to fetch feed for {}: {}", category, e),
        }
    }

    /// First raw item, in feed order, whose link is not cached under `tab`
    fn next_unprocessed(&self, tab: &str, raw_items: &[FeedItem]) -> Option<FeedItem> {
        let processed: HashSet<String> = self
            .cache
            .get(tab, &self.config.language, &self.config.model)
            .unwrap_or_default()
            .iter()
            .flat_map(|record| record.related_links.iter())
            .map(|link| normalize_link(link))
            .collect();

        raw_items
            .iter()
            .find(|item| !item.is_sentinel() && !processed.contains(&normalize_link(&item.link)))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use insight_core::{ClusterRecord, ModelCandidate};
    use insight_gemini::Generation;

    use super::*;
    use crate::aggregation_cache::AggregationCacheConfig;
    use crate::cache_store::MemoryCacheStore;
    use crate::clock::ManualClock;
    use crate::config::InvokerConfig;
    use crate::invoker::ModelInvoker;
    use crate::testing::{snippet_json, ScriptedGenerator, StaticFetcher};

    struct Harness {
        scheduler: IncrementalScheduler,
        fetcher: Arc<StaticFetcher>,
        cache: Arc<AggregationCache>,
        clock: Arc<ManualClock>,
    }

    fn harness(generator: ScriptedGenerator, fetcher: StaticFetcher) -> Harness {
        let clock = ManualClock::new();
        let invoker = ModelInvoker::with_clock(
            Arc::new(generator),
            InvokerConfig {
                candidates: ModelCandidate::ordered(&["gemini-2.5-flash"]),
                ..Default::default()
            },
            clock.clone(),
        );
        let analyzer = Arc::new(NewsAnalyzer::new(Arc::new(invoker)));
        let cache = Arc::new(AggregationCache::new(
            Arc::new(MemoryCacheStore::new()),
            AggregationCacheConfig::default(),
        ));
        let fetcher = Arc::new(fetcher);

        let scheduler = IncrementalScheduler::with_clock(
            fetcher.clone(),
            analyzer,
            cache.clone(),
            SchedulerConfig {
                categories: Some(vec!["world".to_string()]),
                ..Default::default()
            },
            clock.clone(),
        );

        Harness {
            scheduler,
            fetcher,
            cache,
            clock,
        }
    }

    fn items() -> Vec<FeedItem> {
        vec![
            FeedItem::new("First", "https://bbc.co.uk/news/1?at_medium=RSS"),
            FeedItem::new("Second", "https://bbc.co.uk/news/2"),
            FeedItem::new("Third", "https://bbc.co.uk/news/3"),
        ]
    }

    fn processed_link(outcome: &TickOutcome) -> Option<&str> {
        match outcome {
            TickOutcome::Processed { link, .. } => Some(link),
            _ => None,
        }
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link(" HTTPS://BBC.co.uk/News/1?at_medium=RSS "),
            "https://bbc.co.uk/news/1"
        );
        assert_eq!(normalize_link(""), "");
    }

    #[tokio::test]
    async fn test_processes_each_item_once_in_feed_order() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with("world", items()),
        );

        let mut links = Vec::new();
        for _ in 0..3 {
            let outcome = h.scheduler.tick().await;
            links.push(processed_link(&outcome).map(str::to_string));
        }
        assert_eq!(
            links,
            vec![
                Some("https://bbc.co.uk/news/1?at_medium=RSS".to_string()),
                Some("https://bbc.co.uk/news/2".to_string()),
                Some("https://bbc.co.uk/news/3".to_string()),
            ]
        );

        assert_eq!(
            h.scheduler.tick().await,
            TickOutcome::NothingNew {
                category: "world".to_string()
            }
        );

        let cached = h
            .cache
            .get("bbc-world", "English", "gemini-2.5-flash")
            .unwrap();
        assert_eq!(cached.len(), 3);
        assert_eq!(cached[0].related_links, vec!["https://bbc.co.uk/news/3"]);
        assert_eq!(h.fetcher.fetch_count("world"), 1);
    }

    #[tokio::test]
    async fn test_never_reselects_cached_link() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with("world", items()),
        );
        let already = ClusterRecord {
            topic: "Earlier".to_string(),
            related_links: vec!["https://BBC.co.uk/news/1?other=param".to_string()],
            ..Default::default()
        };
        h.cache
            .put("bbc-world", "English", "gemini-2.5-flash", &[already])
            .unwrap();

        let outcome = h.scheduler.tick().await;
        assert_eq!(processed_link(&outcome), Some("https://bbc.co.uk/news/2"));
    }

    #[tokio::test]
    async fn test_failed_analysis_is_retried_later() {
        let generator = ScriptedGenerator::always(&snippet_json("Topic"));
        generator.push("gemini-2.5-flash", Generation::ok("garbage"));
        let h = harness(generator, StaticFetcher::with("world", items()));

        let outcome = h.scheduler.tick().await;
        assert!(matches!(outcome, TickOutcome::AnalysisFailed { .. }));
        assert!(h.cache.get("bbc-world", "English", "gemini-2.5-flash").is_none());

        let outcome = h.scheduler.tick().await;
        assert_eq!(
            processed_link(&outcome),
            Some("https://bbc.co.uk/news/1?at_medium=RSS")
        );
    }

    #[tokio::test]
    async fn test_feed_failure_keeps_stale_items() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with("world", items()),
        );
        assert!(processed_link(&h.scheduler.tick().await).is_some());

        h.fetcher.set_failing(true);
        h.clock.advance(Duration::from_secs(301));

        let outcome = h.scheduler.tick().await;
        assert_eq!(processed_link(&outcome), Some("https://bbc.co.uk/news/2"));
        assert_eq!(h.fetcher.fetch_count("world"), 2);
    }

    #[tokio::test]
    async fn test_dead_feed_waits_for_retry_interval() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with("world", vec![FeedItem::sentinel("Fetch error", "timeout")]),
        );
        let nothing = TickOutcome::NothingNew {
            category: "world".to_string(),
        };

        assert_eq!(h.scheduler.tick().await, nothing);
        assert_eq!(h.scheduler.tick().await, nothing);
        assert_eq!(h.fetcher.fetch_count("world"), 1);

        h.fetcher.set_failing(true);
        h.clock.advance(Duration::from_secs(60));
        assert_eq!(h.scheduler.tick().await, nothing);
        assert_eq!(h.scheduler.tick().await, nothing);
        assert_eq!(h.fetcher.fetch_count("world"), 2);

        h.fetcher.set_failing(false);
        h.fetcher.set("world", items());
        h.clock.advance(Duration::from_secs(60));
        let outcome = h.scheduler.tick().await;
        assert_eq!(
            processed_link(&outcome),
            Some("https://bbc.co.uk/news/1?at_medium=RSS")
        );
        assert_eq!(h.fetcher.fetch_count("world"), 3);
    }

    #[tokio::test]
    async fn test_sentinel_items_are_skipped() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with(
                "world",
                vec![
                    FeedItem::sentinel("Fetch error", "timeout"),
                    FeedItem::new("Real", "https://bbc.co.uk/news/9"),
                ],
            ),
        );

        let outcome = h.scheduler.tick().await;
        assert_eq!(processed_link(&outcome), Some("https://bbc.co.uk/news/9"));
    }

    #[tokio::test]
    async fn test_round_robin_with_world_always_present() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::default(),
        );
        h.fetcher.set("sport", items());
        h.fetcher.set("business", items());

        let scheduler = IncrementalScheduler::with_clock(
            h.fetcher.clone(),
            Arc::clone(&h.scheduler.analyzer),
            h.cache.clone(),
            SchedulerConfig::default(),
            h.clock.clone(),
        );
        assert_eq!(scheduler.categories(), &["business", "sport", "world"]);

        let mut categories = Vec::new();
        for _ in 0..4 {
            categories.push(match scheduler.tick().await {
                TickOutcome::Processed { category, .. } | TickOutcome::NothingNew { category } => {
                    category
                }
                other => panic!("unexpected outcome {:?}", other),
            });
        }
        assert_eq!(categories, vec!["business", "sport", "world", "business"]);
        assert!(h.cache.get("bbc-sport", "English", "gemini-2.5-flash").is_some());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = harness(
            ScriptedGenerator::always(&snippet_json("Topic")),
            StaticFetcher::with("world", items()),
        );
        let _running = h.scheduler.state.lock().await;
        assert_eq!(h.scheduler.tick().await, TickOutcome::Skipped);
    }
}
