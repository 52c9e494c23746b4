//! Service layer for the News Insight aggregator
//!
//! Model invocation with throttling, cooldown and coalescing, prompt-level
//! news analysis, the persistent aggregation cache and the incremental
//! background scheduler.

pub mod aggregation_cache;
pub mod cache_store;
pub mod clock;
pub mod coalescer;
pub mod config;
pub mod cooldown;
pub mod invoker;
pub mod news_analyzer;
pub mod news_scheduler;
pub mod rate_limiter;
pub mod usage;

#[cfg(test)]
mod testing;

pub use aggregation_cache::{AggregationCache, AggregationCacheConfig, CacheError};
pub use cache_store::{CacheStore, MemoryCacheStore, SqliteCacheStore, StoreError, StoredCacheEntry};
pub use clock::{Clock, TokioClock};
pub use coalescer::{request_hash, RequestCoalescer};
pub use config::InvokerConfig;
pub use cooldown::CooldownRegistry;
pub use invoker::{Invocation, InvokeError, ModelInvoker};
pub use news_analyzer::NewsAnalyzer;
pub use news_scheduler::{IncrementalScheduler, SchedulerConfig, TickOutcome};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use usage::UsageTracker;
