//! In-memory backend doubles shared by the unit tests.

use crate::backend::{EntityStore, RelationalExecutor, VectorSearchStore};
use crate::llm::LLMClient;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use relata_common::{EntityRecord, RelationshipQueryPlan};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn plan_from_json(json: &str) -> RelationshipQueryPlan {
    serde_json::from_str(json).expect("plan json")
}

/// Scripted LLM: a fixed generate() response (or a hard failure) and a fixed
/// embedding, with call counters.
pub(crate) struct MockLLM {
    response: Option<String>,
    embedding: Vec<f32>,
    generate_calls: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl MockLLM {
    pub(crate) fn responding(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            embedding: vec![0.1, 0.2, 0.3],
            generate_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            response: None,
            embedding: vec![0.1, 0.2, 0.3],
            generate_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMClient for MockLLM {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(r) => Ok(r.clone()),
            None => Err(anyhow!("backend timeout")),
        }
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embedding.clone())
    }
}

/// Scripted relational executor that records which entry point was used.
pub(crate) struct MockRelationalExecutor {
    rows: Vec<String>,
    execute_calls: AtomicUsize,
    execute_with_limit_calls: AtomicUsize,
}

impl MockRelationalExecutor {
    pub(crate) fn returning(rows: Vec<String>) -> Self {
        Self {
            rows,
            execute_calls: AtomicUsize::new(0),
            execute_with_limit_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn execute_with_limit_calls(&self) -> usize {
        self.execute_with_limit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.execute_calls() + self.execute_with_limit_calls()
    }
}

#[async_trait]
impl RelationalExecutor for MockRelationalExecutor {
    async fn execute(
        &self,
        _text: &str,
        _params: &[(String, serde_json::Value)],
    ) -> Result<Vec<String>> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }

    async fn execute_with_limit(
        &self,
        _text: &str,
        _params: &[(String, serde_json::Value)],
        limit: usize,
    ) -> Result<Vec<String>> {
        self.execute_with_limit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.iter().take(limit).cloned().collect())
    }
}

/// In-memory entity store preserving insertion order per entity type.
pub(crate) struct MemoryEntityStore {
    records: DashMap<String, Vec<EntityRecord>>,
}

impl MemoryEntityStore {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub(crate) fn add(&self, entity_type: &str, record: EntityRecord) {
        self.records
            .entry(entity_type.to_string())
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find_by_entity_type(&self, entity_type: &str) -> Result<Vec<EntityRecord>> {
        Ok(self
            .records
            .get(entity_type)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn find_by_entity_type_and_id(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityRecord>> {
        Ok(self
            .records
            .get(entity_type)
            .and_then(|r| r.value().iter().find(|e| e.entity_id == entity_id).cloned()))
    }
}

/// Scripted vector store: returns the configured hits at or above the given
/// threshold, and remembers the last threshold it was asked for.
pub(crate) struct MockVectorStore {
    hits: Vec<(String, f32)>,
    search_calls: AtomicUsize,
    last_threshold: Mutex<Option<Option<f32>>>,
}

impl MockVectorStore {
    pub(crate) fn returning(hits: Vec<(String, f32)>) -> Self {
        Self {
            hits,
            search_calls: AtomicUsize::new(0),
            last_threshold: Mutex::new(None),
        }
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_threshold(&self) -> Option<Option<f32>> {
        *self.last_threshold.lock().unwrap()
    }
}

#[async_trait]
impl VectorSearchStore for MockVectorStore {
    async fn search(
        &self,
        _entity_type: &str,
        _vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<(String, f32)>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_threshold.lock().unwrap() = Some(score_threshold);
        Ok(self
            .hits
            .iter()
            .filter(|(_, score)| score_threshold.map_or(true, |t| *score >= t))
            .take(limit)
            .cloned()
            .collect())
    }
}
