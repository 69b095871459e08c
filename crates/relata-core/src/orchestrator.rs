use crate::backend::{EntityStore, VectorSearchStore};
use crate::cache::QueryCache;
use crate::executor::{embed_cached, materialize_ids, HybridQueryExecutor};
use crate::llm::LLMClient;
use crate::metrics::QueryMetrics;
use crate::planner::QueryPlanner;
use crate::traversal::TraversalStrategy;
use anyhow::Result;
use relata_common::config::QuerySettings;
use relata_common::{
    ExecutionResult, ExecutionStage, QueryError, RelationshipQueryPlan, ResultDocument,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Wraps the primary executor with the ordered fallback chain. Each stage runs
/// only when the previous one produced zero documents and its configuration
/// flag allows it; an exhausted chain is a typed error, never an empty success.
pub struct ReliabilityOrchestrator {
    executor: Arc<HybridQueryExecutor>,
    planner: Arc<QueryPlanner>,
    metadata: Arc<dyn TraversalStrategy>,
    vector: Option<Arc<dyn VectorSearchStore>>,
    llm: Option<Arc<dyn LLMClient>>,
    store: Arc<dyn EntityStore>,
    cache: Arc<QueryCache>,
    metrics: Arc<QueryMetrics>,
    settings: QuerySettings,
}

impl ReliabilityOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<HybridQueryExecutor>,
        planner: Arc<QueryPlanner>,
        metadata: Arc<dyn TraversalStrategy>,
        vector: Option<Arc<dyn VectorSearchStore>>,
        llm: Option<Arc<dyn LLMClient>>,
        store: Arc<dyn EntityStore>,
        cache: Arc<QueryCache>,
        metrics: Arc<QueryMetrics>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            executor,
            planner,
            metadata,
            vector,
            llm,
            store,
            cache,
            metrics,
            settings,
        }
    }

    pub async fn execute(
        &self,
        text: &str,
        candidate_types: &[String],
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let mut attempts: HashMap<String, u32> = HashMap::new();

        *attempts.entry("PRIMARY".to_string()).or_insert(0) += 1;
        match self
            .executor
            .execute_relationship_query(text, candidate_types)
            .await
        {
            Ok(result) if !result.documents.is_empty() => return Ok(result),
            Ok(_) => {
                tracing::debug!("Primary path produced no documents, entering fallback chain");
            }
            // Planner/builder/store failures are execution failures, not a
            // fallback trigger.
            Err(e) => {
                self.metrics
                    .record_execution_failure(started.elapsed().as_millis() as u64);
                return Err(e);
            }
        }

        // The plan drives every fallback stage; re-obtaining it here is a
        // plan-cache hit in practice.
        let plan = match self.planner.plan_query(text, candidate_types).await {
            Ok(p) => p,
            Err(e) => {
                self.metrics
                    .record_execution_failure(started.elapsed().as_millis() as u64);
                return Err(e);
            }
        };

        if self.settings.fallback_to_metadata {
            let stage = ExecutionStage::FallbackMetadata;
            *attempts.entry(stage.as_str().to_string()).or_insert(0) += 1;
            let documents = self.metadata_stage(&plan).await?;
            self.metrics
                .record_fallback_stage(stage.as_str(), !documents.is_empty(), documents.len());
            if !documents.is_empty() {
                tracing::info!(
                    "Metadata fallback answered '{}' with {} documents",
                    plan.original_query,
                    documents.len()
                );
                return Ok(ExecutionResult::fallback(documents, stage));
            }
        }

        if self.settings.fallback_to_vector_search && plan.semantic_query.is_some() {
            if let (Some(vector), Some(llm)) = (&self.vector, &self.llm) {
                let stage = ExecutionStage::FallbackVector;
                *attempts.entry(stage.as_str().to_string()).or_insert(0) += 1;
                let documents = self.vector_stage(&plan, vector, llm).await?;
                self.metrics
                    .record_fallback_stage(stage.as_str(), !documents.is_empty(), documents.len());
                if !documents.is_empty() {
                    tracing::info!(
                        "Vector fallback answered '{}' with {} documents",
                        plan.original_query,
                        documents.len()
                    );
                    return Ok(ExecutionResult::fallback(documents, stage));
                }
            }
        }

        // Last resort before exhaustion: an unfiltered, bounded scan.
        let stage = ExecutionStage::FallbackSimple;
        *attempts.entry(stage.as_str().to_string()).or_insert(0) += 1;
        let documents = self.simple_stage(&plan).await?;
        self.metrics
            .record_fallback_stage(stage.as_str(), !documents.is_empty(), documents.len());
        if !documents.is_empty() {
            return Ok(ExecutionResult::fallback(documents, stage));
        }

        tracing::warn!(
            "Fallback chain exhausted for '{}' (attempts: {:?})",
            plan.original_query,
            attempts
        );
        Err(QueryError::chain_exhausted(plan, attempts).into())
    }

    /// Unbounded metadata scan over the primary entity type; the stage itself
    /// imposes no limit, the plan's filters do the narrowing.
    async fn metadata_stage(&self, plan: &RelationshipQueryPlan) -> Result<Vec<ResultDocument>> {
        let ids = self.metadata.traverse(plan, None).await?;
        materialize_ids(self.store.as_ref(), &plan.primary_entity_type, &ids, &HashMap::new())
            .await
    }

    /// Thresholded vector search over the plan's semantic text, hits ordered
    /// by descending score.
    async fn vector_stage(
        &self,
        plan: &RelationshipQueryPlan,
        vector: &Arc<dyn VectorSearchStore>,
        llm: &Arc<dyn LLMClient>,
    ) -> Result<Vec<ResultDocument>> {
        let embedding = embed_cached(&self.cache, llm, plan.semantic_text()).await?;
        let mut hits = vector
            .search(
                &plan.primary_entity_type,
                &embedding,
                self.settings.vector_search_limit,
                Some(self.settings.vector_score_threshold),
            )
            .await?;
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let scores: HashMap<String, f32> = hits.into_iter().collect();
        materialize_ids(self.store.as_ref(), &plan.primary_entity_type, &ids, &scores).await
    }

    /// Everything of the primary type, truncated to the configured bound.
    async fn simple_stage(&self, plan: &RelationshipQueryPlan) -> Result<Vec<ResultDocument>> {
        let mut records = self
            .store
            .find_by_entity_type(&plan.primary_entity_type)
            .await?;
        records.truncate(self.settings.simple_fallback_limit);

        Ok(records
            .into_iter()
            .map(|record| {
                let metadata = record
                    .metadata
                    .as_deref()
                    .and_then(|blob| serde_json::from_str(blob).ok())
                    .unwrap_or_else(|| json!({}));
                ResultDocument {
                    id: record.entity_id,
                    content: record.content,
                    metadata,
                    score: None,
                }
            })
            .collect())
    }
}
