//! Invoker configuration
//!
//! Every tuning constant of the model invoker lives here with its default;
//! `from_env` overrides individual values.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use insight_core::ModelCandidate;

/// Fallback order, cheapest tier first
pub const DEFAULT_MODELS: [&str; 10] = [
    "gemini-2.0-flash-lite",
    "gemini-2.0-flash-lite-001",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-001",
    "gemini-2.5-flash",
    "gemini-2.0-pro",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

/// Moving "latest" identifiers pinned to known-good versions
pub const DEFAULT_ALIASES: [(&str, &str); 3] = [
    ("gemini-flash-latest", "gemini-2.5-flash"),
    ("gemini-flash-lite-latest", "gemini-2.5-flash-lite"),
    ("gemini-pro-latest", "gemini-1.5-pro"),
];

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Fallback candidates, tried in ascending priority
    pub candidates: Vec<ModelCandidate>,
    /// alias -> canonical model id
    pub aliases: HashMap<String, String>,
    /// Minimum spacing between invocations
    pub min_request_interval: Duration,
    /// How long a failed model is skipped
    pub model_cooldown: Duration,
    /// Bound on waiting for an identical in-flight request
    pub coalesce_wait: Duration,
    /// Delay before the second and later attempts of one invocation
    pub fallback_delay: Duration,
    /// Extra delay after a 429
    pub rate_limit_backoff: Duration,
    /// Window used to estimate the retry hint after exhaustion
    pub rate_limit_cooldown: Duration,
    /// Usage counters reset period
    pub usage_reset_interval: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            candidates: ModelCandidate::ordered(&DEFAULT_MODELS[..]),
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(alias, model)| (alias.to_string(), model.to_string()))
                .collect(),
            min_request_interval: Duration::from_millis(4500),
            model_cooldown: Duration::from_secs(300),
            coalesce_wait: Duration::from_millis(5000),
            fallback_delay: Duration::from_millis(1000),
            rate_limit_backoff: Duration::from_millis(2000),
            rate_limit_cooldown: Duration::from_secs(60),
            usage_reset_interval: Duration::from_secs(3600),
        }
    }
}

impl InvokerConfig {
    /// Load from environment, falling back to defaults per value
    ///
    /// - `GEMINI_MODELS`: comma-separated fallback order
    /// - `GEMINI_MODEL_ALIASES`: comma-separated `alias=model` pairs
    /// - `INVOKER_*`: timing overrides (milliseconds or seconds per suffix)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let candidates = env::var("GEMINI_MODELS")
            .ok()
            .map(|raw| split_list(&raw))
            .filter(|models| !models.is_empty())
            .map(|models| ModelCandidate::ordered(models.as_slice()))
            .unwrap_or(defaults.candidates);

        let aliases = env::var("GEMINI_MODEL_ALIASES")
            .ok()
            .map(|raw| parse_aliases(&raw))
            .unwrap_or(defaults.aliases);

        Self {
            candidates,
            aliases,
            min_request_interval: env_millis("INVOKER_MIN_INTERVAL_MS")
                .unwrap_or(defaults.min_request_interval),
            model_cooldown: env_secs("INVOKER_MODEL_COOLDOWN_SECS")
                .unwrap_or(defaults.model_cooldown),
            coalesce_wait: env_millis("INVOKER_COALESCE_WAIT_MS").unwrap_or(defaults.coalesce_wait),
            fallback_delay: env_millis("INVOKER_FALLBACK_DELAY_MS")
                .unwrap_or(defaults.fallback_delay),
            rate_limit_backoff: env_millis("INVOKER_RATE_LIMIT_BACKOFF_MS")
                .unwrap_or(defaults.rate_limit_backoff),
            rate_limit_cooldown: env_secs("INVOKER_RATE_LIMIT_COOLDOWN_SECS")
                .unwrap_or(defaults.rate_limit_cooldown),
            usage_reset_interval: env_secs("INVOKER_USAGE_RESET_SECS")
                .unwrap_or(defaults.usage_reset_interval),
        }
    }

    /// Canonical id for a possibly aliased model
    pub fn resolve_alias(&self, model: &str) -> String {
        let model = model.trim();
        self.aliases
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    /// Candidates sorted by ascending priority
    pub fn ordered_candidates(&self) -> Vec<&ModelCandidate> {
        let mut ordered: Vec<_> = self.candidates.iter().collect();
        ordered.sort_by_key(|c| c.priority);
        ordered
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub(crate) fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

pub(crate) fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_aliases(raw: &str) -> HashMap<String, String> {
    split_list(raw)
        .iter()
        .filter_map(|pair| {
            let (alias, model) = pair.split_once('=')?;
            let (alias, model) = (alias.trim(), model.trim());
            (!alias.is_empty() && !model.is_empty()).then(|| (alias.to_string(), model.to_string()))
        })
        .collect()
}
