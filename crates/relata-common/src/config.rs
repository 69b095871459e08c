use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

// --- Constants for Default Configuration ---
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 5000;
pub const DEFAULT_VECTOR_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_VECTOR_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_SIMPLE_FALLBACK_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    /// Any OpenAI-compatible endpoint; the default targets OpenAI itself.
    pub base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
}

/// Knobs for the fallback chain and search bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    pub fallback_to_metadata: bool,
    pub fallback_to_vector_search: bool,
    pub vector_search_limit: usize,
    pub vector_score_threshold: f32,
    pub simple_fallback_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LLMConfig,
    pub cache: CacheSettings,
    pub metrics: MetricsSettings,
    pub query: QuerySettings,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: String::new(),
            embedding_model: String::new(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            fallback_to_metadata: true,
            fallback_to_vector_search: true,
            vector_search_limit: DEFAULT_VECTOR_SEARCH_LIMIT,
            vector_score_threshold: DEFAULT_VECTOR_SCORE_THRESHOLD,
            simple_fallback_limit: DEFAULT_SIMPLE_FALLBACK_LIMIT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            cache: CacheSettings::default(),
            metrics: MetricsSettings::default(),
            query: QuerySettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Default settings
            .set_default("llm.model", "")?
            .set_default("llm.embedding_model", "")?
            .set_default("cache.enabled", true)?
            .set_default("cache.ttl_secs", DEFAULT_CACHE_TTL_SECS)?
            .set_default("cache.max_entries", DEFAULT_CACHE_MAX_ENTRIES as i64)?
            .set_default("metrics.enabled", true)?
            .set_default("query.fallback_to_metadata", true)?
            .set_default("query.fallback_to_vector_search", true)?
            .set_default("query.vector_search_limit", DEFAULT_VECTOR_SEARCH_LIMIT as i64)?
            .set_default("query.vector_score_threshold", DEFAULT_VECTOR_SCORE_THRESHOLD as f64)?
            .set_default("query.simple_fallback_limit", DEFAULT_SIMPLE_FALLBACK_LIMIT as i64)?
            // File: config.toml
            .add_source(File::with_name("config").required(false))
            // Environment: RELATA_QUERY__FALLBACK_TO_METADATA=false -> query.fallback_to_metadata
            .add_source(Environment::with_prefix("RELATA").separator("__"))
            // Legacy ENV overrides (for backward compatibility during migration)
            .set_override_option("llm.api_key", env::var("OPENAI_API_KEY").ok())?
            .set_override_option("llm.base_url", env::var("LLM_BASE_URL").ok())?
            .set_override_option("llm.model", env::var("LLM_MODEL").ok())?
            .set_override_option("llm.embedding_model", env::var("EMBEDDING_MODEL").ok())?
            .build()?;

        s.try_deserialize()
    }
}
