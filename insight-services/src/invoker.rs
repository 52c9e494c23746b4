//! Resilient model invocation
//!
//! [`ModelInvoker`] is the single gateway to the text-generation service:
//! it throttles every call, walks an ordered list of model candidates,
//! cools down models that fail and coalesces identical in-flight prompts.

use std::sync::Arc;
use std::time::Duration;

use insight_core::{ModelStatus, UsageSnapshot};
use insight_gemini::{Generation, TextGenerator};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, TokioClock};
use crate::coalescer::{request_hash, RequestCoalescer};
use crate::config::InvokerConfig;
use crate::cooldown::CooldownRegistry;
use crate::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::usage::UsageTracker;

/// Upper bound on error body text kept for logs
const MAX_ERROR_BODY: usize = 200;

/// Text produced by a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub text: String,
    pub model_used: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("API key missing: configure GEMINI_API_KEY")]
    ConfigMissing,

    #[error("All models are cooling down")]
    AllModelsUnavailable,

    #[error("All models failed after {attempts} attempts. {retry_hint}")]
    AllModelsExhausted { attempts: usize, retry_hint: String },

    #[error("Model invocation cancelled")]
    Cancelled,
}

impl InvokeError {
    /// Whether the service as a whole is temporarily unable to answer
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            InvokeError::AllModelsUnavailable | InvokeError::AllModelsExhausted { .. }
        )
    }
}

/// Why a single attempt against one model failed
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum AttemptFailure {
    #[error("rate limited (429)")]
    RateLimited,

    #[error("model unavailable ({0})")]
    ModelUnavailable(u16),

    #[error("blocked by safety filter")]
    SafetyBlocked,

    #[error("empty response")]
    EmptyResponse,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Map a raw generation onto success text or a failure class
pub(crate) fn classify(generation: Generation) -> Result<String, AttemptFailure> {
    match generation.status {
        429 => return Err(AttemptFailure::RateLimited),
        503 | 404 => return Err(AttemptFailure::ModelUnavailable(generation.status)),
        status if !generation.is_success() => {
            let body = generation.error_body.unwrap_or_default();
            let body = match body.char_indices().nth(MAX_ERROR_BODY) {
                Some((idx, _)) => body[..idx].to_string(),
                None => body,
            };
            return Err(AttemptFailure::Http { status, body });
        }
        _ => {}
    }

    if generation.is_safety_blocked() {
        return Err(AttemptFailure::SafetyBlocked);
    }

    generation
        .usable_text()
        .map(str::to_string)
        .ok_or(AttemptFailure::EmptyResponse)
}

/// Single gateway to the text-generation service
pub struct ModelInvoker {
    generator: Arc<dyn TextGenerator>,
    config: InvokerConfig,
    clock: Arc<dyn Clock>,
    throttle: RateLimiter,
    cooldowns: CooldownRegistry,
    usage: UsageTracker,
    coalescer: RequestCoalescer,
    /// Most recent 429 from any model, for the exhaustion hint
    last_rate_limit: Mutex<Option<Instant>>,
}

impl ModelInvoker {
    pub fn new(generator: Arc<dyn TextGenerator>, config: InvokerConfig) -> Self {
        Self::with_clock(generator, config, TokioClock::shared())
    }

    pub fn with_clock(
        generator: Arc<dyn TextGenerator>,
        config: InvokerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Initializing ModelInvoker with {} candidates, {:?} between calls",
            config.candidates.len(),
            config.min_request_interval
        );

        Self {
            throttle: RateLimiter::new(config.min_request_interval, "gemini", clock.clone()),
            cooldowns: CooldownRegistry::new(config.model_cooldown, clock.clone()),
            usage: UsageTracker::new(config.usage_reset_interval, clock.clone()),
            coalescer: RequestCoalescer::new(config.coalesce_wait, clock.clone()),
            last_rate_limit: Mutex::new(None),
            generator,
            config,
            clock,
        }
    }

    /// Generate text for `prompt`, falling back across models
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn invoke(
        &self,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<Invocation, InvokeError> {
        if !self.generator.is_configured() {
            return Err(InvokeError::ConfigMissing);
        }
        let preferred_model = preferred_model.map(str::trim).filter(|m| !m.is_empty());

        let hash = request_hash(prompt, preferred_model);
        let _registration = self.coalescer.acquire(&hash).await;

        // Reserve the throttle slot only once the coalescer has let us through,
        // so the interval is measured from when the call actually goes out.
        self.throttle.acquire().await;
        self.usage.reset_if_due();

        let candidates = self.candidate_list(preferred_model);
        if candidates.is_empty() {
            warn!("No model available: every candidate is cooling down");
            return Err(InvokeError::AllModelsUnavailable);
        }
        debug!("Candidate models: {:?}", candidates);

        let mut failures = Vec::with_capacity(candidates.len());
        for (attempt, model) in candidates.iter().enumerate() {
            if attempt > 0 {
                self.clock.sleep(self.config.fallback_delay).await;
            }

            self.usage.record_call(model);
            let outcome = match self.generator.generate_content(model, prompt).await {
                Ok(generation) => classify(generation),
                Err(e) => Err(AttemptFailure::Transport(e.to_string())),
            };

            let failure = match outcome {
                Ok(text) => {
                    info!("Model {} answered (attempt {})", model, attempt + 1);
                    return Ok(Invocation {
                        text,
                        model_used: model.clone(),
                    });
                }
                Err(failure) => failure,
            };

            self.cooldowns.mark(model);
            let has_next = attempt + 1 < candidates.len();

            if failure == AttemptFailure::RateLimited {
                self.usage.record_rate_limit(model);
                *self.last_rate_limit.lock() = Some(self.clock.now());
                warn!("Rate limit (429) hit for model {}, cooling down", model);
                if has_next {
                    self.clock.sleep(self.config.rate_limit_backoff).await;
                }
            } else {
                warn!("Model {} failed: {}, cooling down", model, failure);
            }

            failures.push(format!("{}: {}", model, failure));
        }

        warn!("All models failed: {}", failures.join(" | "));
        Err(InvokeError::AllModelsExhausted {
            attempts: failures.len(),
            retry_hint: self.retry_hint(),
        })
    }

    /// [`invoke`](Self::invoke) bounded by `timeout`
    pub async fn invoke_with_timeout(
        &self,
        prompt: &str,
        preferred_model: Option<&str>,
        timeout: Duration,
    ) -> Result<Invocation, InvokeError> {
        tokio::time::timeout(timeout, self.invoke(prompt, preferred_model))
            .await
            .unwrap_or_else(|_| {
                warn!("Model invocation timed out after {:?}", timeout);
                Err(InvokeError::Cancelled)
            })
    }

    /// Preferred model first, then configured candidates, minus cooled-down
    /// models and duplicates
    fn candidate_list(&self, preferred_model: Option<&str>) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();

        if let Some(preferred) = preferred_model {
            let resolved = self.config.resolve_alias(preferred);
            if self.cooldowns.is_cooling_down(&resolved) {
                debug!("Preferred model {} is cooling down", resolved);
            } else {
                models.push(resolved);
            }
        }

        for candidate in self.config.ordered_candidates() {
            if models.contains(&candidate.id) || self.cooldowns.is_cooling_down(&candidate.id) {
                continue;
            }
            models.push(candidate.id.clone());
        }

        models
    }

    fn retry_hint(&self) -> String {
        let Some(limited_at) = *self.last_rate_limit.lock() else {
            return "Please retry shortly.".to_string();
        };

        let elapsed = self.clock.now().saturating_duration_since(limited_at);
        let remaining = self.config.rate_limit_cooldown.saturating_sub(elapsed);
        if remaining.is_zero() {
            "Rate limit window has passed; retry now.".to_string()
        } else {
            format!(
                "Rate limited; please wait {} seconds.",
                remaining.as_secs_f64().ceil() as u64
            )
        }
    }

    pub fn usage_stats(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    pub fn model_statuses(&self) -> Vec<ModelStatus> {
        self.config
            .ordered_candidates()
            .into_iter()
            .map(|candidate| {
                let remaining = self.cooldowns.remaining(&candidate.id);
                ModelStatus {
                    id: candidate.id.clone(),
                    priority: candidate.priority,
                    cooling_down: remaining.is_some(),
                    cooldown_remaining_ms: remaining.map(|d| d.as_millis() as u64).unwrap_or(0),
                }
            })
            .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_configured()
    }

    /// Requests currently registered with the coalescer
    pub fn in_flight(&self) -> usize {
        self.coalescer.pending_count()
    }

    /// Global throttle counters
    pub fn throttle_stats(&self) -> RateLimiterStats {
        self.throttle.stats()
    }
}
