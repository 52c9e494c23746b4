//! Aggregation cache
//!
//! Stores ordered cluster lists (newest first) per `(tab, language, model)`
//! and per-URL article analyses on top of a [`CacheStore`]. Writes are
//! serialized so a merge's read-modify-write cannot interleave with another
//! write; reads go straight to the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use insight_core::{AnalysisResponse, ClusterRecord};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache_store::{CacheStore, StoreError, StoredCacheEntry};
use crate::config::{env_parse, env_secs};

const ARTICLE_TAB: &str = "article";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Existing entry {key} is unreadable: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AggregationCacheConfig {
    /// Lifetime of a written entry
    pub ttl: Duration,
    /// Longest list kept per key
    pub max_records: usize,
}

impl Default for AggregationCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
            max_records: 100,
        }
    }
}

impl AggregationCacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: env_secs("CACHE_TTL_SECS").unwrap_or(defaults.ttl),
            max_records: env_parse::<usize>("CACHE_MAX_RECORDS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_records),
        }
    }
}

/// Composite key with every non-alphanumeric character removed from each part
pub fn cache_key(tab: &str, lang: &str, model: &str) -> String {
    format!("{}_{}_{}", normalize(tab), normalize(lang), normalize(model))
}

fn normalize(part: &str) -> String {
    part.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn article_key(url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    format!("article_{}", hex::encode(digest))
}

/// Prepend, dedup by identity (first occurrence wins) and cap
pub fn merge_records(
    newest: Vec<ClusterRecord>,
    existing: Vec<ClusterRecord>,
    cap: usize,
) -> Vec<ClusterRecord> {
    let mut seen = HashSet::new();
    newest
        .into_iter()
        .chain(existing)
        .filter(|record| seen.insert(record.dedup_key()))
        .take(cap)
        .collect()
}

pub struct AggregationCache {
    store: Arc<dyn CacheStore>,
    config: AggregationCacheConfig,
    write_lock: Mutex<()>,
}

impl AggregationCache {
    pub fn new(store: Arc<dyn CacheStore>, config: AggregationCacheConfig) -> Self {
        Self {
            store,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Freshest list for the key; absent if missing, expired or undecodable
    pub fn get(&self, tab: &str, lang: &str, model: &str) -> Option<Vec<ClusterRecord>> {
        let key = cache_key(tab, lang, model);
        let entry = self.live_entry(&key)?;
        match serde_json::from_str(&entry.data_json) {
            Ok(records) => Some(records),
            Err(e) => {
                warn!("Cache entry {} is undecodable: {}", key, e);
                None
            }
        }
    }

    /// Wholesale overwrite with a fresh expiry
    pub fn put(
        &self,
        tab: &str,
        lang: &str,
        model: &str,
        records: &[ClusterRecord],
    ) -> Result<(), CacheError> {
        let _write = self.write_lock.lock();
        self.write(tab, lang, model, serde_json::to_string(records)?)
    }

    /// Prepend `new_records` to the stored list and persist the result
    ///
    /// Aborts without writing if the stored entry cannot be decoded.
    pub fn merge(
        &self,
        tab: &str,
        lang: &str,
        model: &str,
        new_records: Vec<ClusterRecord>,
    ) -> Result<Vec<ClusterRecord>, CacheError> {
        let key = cache_key(tab, lang, model);
        let _write = self.write_lock.lock();

        let existing: Vec<ClusterRecord> = match self.store.get(&key)? {
            Some(entry) if !entry.is_expired(Utc::now()) => serde_json::from_str(&entry.data_json)
                .map_err(|e| CacheError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                })?,
            _ => Vec::new(),
        };

        let added = new_records.len();
        let before = existing.len();
        let merged = merge_records(new_records, existing, self.config.max_records);

        self.write(tab, lang, model, serde_json::to_string(&merged)?)?;
        debug!(
            "Merged {} records into {} ({} -> {})",
            added,
            key,
            before,
            merged.len()
        );
        Ok(merged)
    }

    /// Union of every live entry for a tab and language across models,
    /// newest entry first
    pub fn get_all_for_tab(&self, tab: &str, lang: &str) -> Vec<ClusterRecord> {
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list cache entries: {}", e);
                return Vec::new();
            }
        };

        let (tab, lang) = (normalize(tab), normalize(lang));
        let now = Utc::now();

        let mut combined = Vec::new();
        for entry in entries
            .iter()
            .filter(|e| normalize(&e.tab) == tab && normalize(&e.language) == lang)
            .filter(|e| !e.is_expired(now))
        {
            match serde_json::from_str::<Vec<ClusterRecord>>(&entry.data_json) {
                Ok(records) => combined.push(records),
                Err(e) => warn!("Skipping undecodable entry {}: {}", entry.cache_key, e),
            }
        }

        combined
            .into_iter()
            .fold(Vec::new(), |acc, records| merge_records(acc, records, usize::MAX))
            .into_iter()
            .take(self.config.max_records)
            .collect()
    }

    pub fn get_article_analysis(&self, url: &str) -> Option<AnalysisResponse> {
        let entry = self.live_entry(&article_key(url))?;
        serde_json::from_str(&entry.data_json).ok()
    }

    pub fn put_article_analysis(
        &self,
        url: &str,
        response: &AnalysisResponse,
    ) -> Result<(), CacheError> {
        let data_json = serde_json::to_string(response)?;
        let _write = self.write_lock.lock();
        let now = Utc::now();
        self.store.put(&StoredCacheEntry {
            cache_key: article_key(url),
            tab: ARTICLE_TAB.to_string(),
            language: String::new(),
            model: String::new(),
            data_json,
            created_at: now,
            expires_at: self.expiry(now),
        })?;
        Ok(())
    }

    /// Expiry sweep
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let _write = self.write_lock.lock();
        let purged = self.store.purge_expired(Utc::now())?;
        if purged > 0 {
            info!("Purged {} expired cache entries", purged);
        }
        Ok(purged)
    }

    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let _write = self.write_lock.lock();
        let cleared = self.store.clear()?;
        info!("Cleared {} cache entries", cleared);
        Ok(cleared)
    }

    pub fn entries(&self) -> Result<Vec<StoredCacheEntry>, CacheError> {
        Ok(self.store.list()?)
    }

    fn live_entry(&self, key: &str) -> Option<StoredCacheEntry> {
        match self.store.get(key) {
            Ok(Some(entry)) if !entry.is_expired(Utc::now()) => Some(entry),
            Ok(_) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Caller holds the write lock
    fn write(&self, tab: &str, lang: &str, model: &str, data_json: String) -> Result<(), CacheError> {
        let now = Utc::now();
        self.store.put(&StoredCacheEntry {
            cache_key: cache_key(tab, lang, model),
            tab: tab.to_string(),
            language: lang.to_string(),
            model: model.to_string(),
            data_json,
            created_at: now,
            expires_at: self.expiry(now),
        })?;
        Ok(())
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
