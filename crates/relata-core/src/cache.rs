//! Memoization for plans, query results and embeddings. Plans and results
//! are deterministic functions of their fingerprints, so racing writers on
//! the same key resolve last-writer-wins.

use relata_common::RelationshipQueryPlan;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Identifier list cached for one execution fingerprint. Carries enough
/// context to materialize documents without re-planning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedQueryResult {
    pub primary_entity_type: String,
    pub ids: Vec<String>,
    pub hybrid_search_used: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    access_count: usize,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            access_count: 0,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(relata_common::config::DEFAULT_CACHE_TTL_SECS),
            max_entries: relata_common::config::DEFAULT_CACHE_MAX_ENTRIES,
            enabled: true,
        }
    }
}

impl From<&relata_common::config::CacheSettings> for CacheConfig {
    fn from(settings: &relata_common::config::CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries: settings.max_entries,
            enabled: settings.enabled,
        }
    }
}

/// Query cache with three keyspaces: plans and results keyed by fingerprint,
/// embeddings keyed by the exact text embedded. Every operation is a no-op
/// when the cache is disabled.
pub struct QueryCache {
    plans: Arc<RwLock<HashMap<String, CacheEntry<RelationshipQueryPlan>>>>,
    results: Arc<RwLock<HashMap<String, CacheEntry<CachedQueryResult>>>>,
    embeddings: Arc<RwLock<HashMap<String, CacheEntry<Vec<f32>>>>>,
    config: CacheConfig,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            plans: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
            embeddings: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    async fn get_from<T: Clone>(
        &self,
        map: &RwLock<HashMap<String, CacheEntry<T>>>,
        key: &str,
    ) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let mut cache = map.write().await;

        if let Some(entry) = cache.get_mut(key) {
            if entry.is_expired(self.config.ttl) {
                cache.remove(key);
                return None;
            }

            entry.access_count += 1;
            tracing::debug!("Cache HIT for {} (access_count={})", key, entry.access_count);
            return Some(entry.value.clone());
        }

        tracing::debug!("Cache MISS for {}", key);
        None
    }

    async fn put_into<T>(
        &self,
        map: &RwLock<HashMap<String, CacheEntry<T>>>,
        key: String,
        value: T,
    ) {
        if !self.config.enabled {
            return;
        }

        let mut cache = map.write().await;

        if cache.len() >= self.config.max_entries {
            // LRU eviction: least accessed, oldest first
            if let Some(lru_key) = cache
                .iter()
                .min_by_key(|(_, v)| (v.access_count, v.created_at))
                .map(|(k, _)| k.clone())
            {
                cache.remove(&lru_key);
                tracing::debug!("Evicted LRU cache entry: {}", lru_key);
            }
        }

        cache.insert(key, CacheEntry::new(value));
    }

    pub async fn get_plan(&self, fingerprint: &str) -> Option<RelationshipQueryPlan> {
        self.get_from(&self.plans, fingerprint).await
    }

    pub async fn put_plan(&self, fingerprint: String, plan: RelationshipQueryPlan) {
        self.put_into(&self.plans, fingerprint, plan).await
    }

    pub async fn get_query_result(&self, fingerprint: &str) -> Option<CachedQueryResult> {
        self.get_from(&self.results, fingerprint).await
    }

    pub async fn put_query_result(&self, fingerprint: String, result: CachedQueryResult) {
        self.put_into(&self.results, fingerprint, result).await
    }

    pub async fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
        self.get_from(&self.embeddings, text).await
    }

    pub async fn put_embedding(&self, text: String, embedding: Vec<f32>) {
        self.put_into(&self.embeddings, text, embedding).await
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            plan_cache_size: self.plans.read().await.len(),
            result_cache_size: self.results.read().await.len(),
            embedding_cache_size: self.embeddings.read().await.len(),
            max_entries: self.config.max_entries,
        }
    }

    pub async fn clear(&self) {
        self.plans.write().await.clear();
        self.results.write().await.clear();
        self.embeddings.write().await.clear();
        tracing::info!("Cleared all query caches");
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub plan_cache_size: usize,
    pub result_cache_size: usize,
    pub embedding_cache_size: usize,
    pub max_entries: usize,
}
