//! External collaborator seams. The engine never talks to a concrete store
//! directly; each backend is injected as an `Arc<dyn ...>` picked at startup.

use anyhow::Result;
use async_trait::async_trait;
use relata_common::EntityRecord;

/// Executes compiled query text against the underlying relational engine.
/// Each row must be convertible to a single identifier.
#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    async fn execute(
        &self,
        text: &str,
        params: &[(String, serde_json::Value)],
    ) -> Result<Vec<String>>;

    /// Same as [`execute`](Self::execute) but with a row limit applied by the
    /// store. Callers must not invoke this when no limit is set.
    async fn execute_with_limit(
        &self,
        text: &str,
        params: &[(String, serde_json::Value)],
        limit: usize,
    ) -> Result<Vec<String>>;
}

/// Similarity search over pre-embedded entities, scoped to one entity type.
/// Results are ordered by descending score.
#[async_trait]
pub trait VectorSearchStore: Send + Sync {
    async fn search(
        &self,
        entity_type: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<(String, f32)>>;
}

/// Read access to persisted entities and their raw metadata blobs.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_by_entity_type(&self, entity_type: &str) -> Result<Vec<EntityRecord>>;

    async fn find_by_entity_type_and_id(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityRecord>>;
}
