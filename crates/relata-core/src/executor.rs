use crate::backend::{EntityStore, VectorSearchStore};
use crate::builder::QueryBuilder;
use crate::cache::{CachedQueryResult, QueryCache};
use crate::llm::LLMClient;
use crate::planner::QueryPlanner;
use crate::traversal::TraversalStrategy;
use anyhow::Result;
use relata_common::config::QuerySettings;
use relata_common::{fingerprint, ExecutionResult, ResultDocument};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Primary execution path: plan, compile, run relationally (with an internal
/// metadata retry), optionally fold in semantic vector hits, materialize
/// documents. Successful results carry no execution stage tag.
pub struct HybridQueryExecutor {
    planner: Arc<QueryPlanner>,
    builder: QueryBuilder,
    relational: Arc<dyn TraversalStrategy>,
    metadata: Arc<dyn TraversalStrategy>,
    vector: Option<Arc<dyn VectorSearchStore>>,
    llm: Option<Arc<dyn LLMClient>>,
    store: Arc<dyn EntityStore>,
    cache: Arc<QueryCache>,
    settings: QuerySettings,
}

impl HybridQueryExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planner: Arc<QueryPlanner>,
        builder: QueryBuilder,
        relational: Arc<dyn TraversalStrategy>,
        metadata: Arc<dyn TraversalStrategy>,
        vector: Option<Arc<dyn VectorSearchStore>>,
        llm: Option<Arc<dyn LLMClient>>,
        store: Arc<dyn EntityStore>,
        cache: Arc<QueryCache>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            planner,
            builder,
            relational,
            metadata,
            vector,
            llm,
            store,
            cache,
            settings,
        }
    }

    pub async fn execute_relationship_query(
        &self,
        text: &str,
        candidate_types: &[String],
    ) -> Result<ExecutionResult> {
        let fp = fingerprint(text, candidate_types);

        // A result-cache hit skips planning, building and traversal entirely.
        if let Some(cached) = self.cache.get_query_result(&fp).await {
            let documents = materialize_ids(
                self.store.as_ref(),
                &cached.primary_entity_type,
                &cached.ids,
                &HashMap::new(),
            )
            .await?;
            let mut result = ExecutionResult::primary(documents, cached.hybrid_search_used);
            result.metadata.insert("cache_hit".to_string(), json!(true));
            return Ok(result);
        }

        let plan = self.planner.plan_query(text, candidate_types).await?;
        let query = self.builder.build(&plan)?;

        let mut ids = self.relational.traverse(&plan, Some(&query)).await?;
        if ids.is_empty() {
            tracing::debug!("Relational traversal empty, retrying against cached metadata");
            ids = self.metadata.traverse(&plan, Some(&query)).await?;
        }

        let mut scores: HashMap<String, f32> = HashMap::new();
        let mut hybrid_search_used = false;

        if plan.needs_semantic_search {
            if let (Some(vector), Some(llm)) = (&self.vector, &self.llm) {
                let embed_text = plan.semantic_text().to_string();
                let embedding = embed_cached(&self.cache, llm, &embed_text).await?;
                let hits = vector
                    .search(
                        &plan.primary_entity_type,
                        &embedding,
                        self.settings.vector_search_limit,
                        None,
                    )
                    .await?;
                for (id, score) in &hits {
                    scores.insert(id.clone(), *score);
                }
                ids = merge_vector_first(&hits, ids);
                hybrid_search_used = true;
            } else {
                tracing::debug!("Plan requested semantic search but no vector backend is wired");
            }
        }

        let documents =
            materialize_ids(self.store.as_ref(), &plan.primary_entity_type, &ids, &scores).await?;

        // Only a miss that produced something is worth remembering.
        if !documents.is_empty() {
            self.cache
                .put_query_result(
                    fp,
                    CachedQueryResult {
                        primary_entity_type: plan.primary_entity_type.clone(),
                        ids,
                        hybrid_search_used,
                    },
                )
                .await;
        }

        Ok(ExecutionResult::primary(documents, hybrid_search_used))
    }
}

/// Vector hits go first, then the relational/metadata hits, de-duplicated by
/// id with vector order taking precedence.
fn merge_vector_first(hits: &[(String, f32)], ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (id, _) in hits {
        if seen.insert(id.clone()) {
            merged.push(id.clone());
        }
    }
    for id in ids {
        if seen.insert(id.clone()) {
            merged.push(id);
        }
    }
    merged
}

/// Embedding lookup keyed by the exact text embedded; the primary hybrid path
/// and the vector fallback stage share entries through this.
pub(crate) async fn embed_cached(
    cache: &QueryCache,
    llm: &Arc<dyn LLMClient>,
    text: &str,
) -> Result<Vec<f32>> {
    if let Some(embedding) = cache.get_embedding(text).await {
        return Ok(embedding);
    }
    let embedding = llm.embed(text).await?;
    cache.put_embedding(text.to_string(), embedding.clone()).await;
    Ok(embedding)
}

/// Looks up each id in the entity store and turns it into a document with
/// parsed metadata. Ids the store no longer knows are dropped.
pub(crate) async fn materialize_ids(
    store: &dyn EntityStore,
    entity_type: &str,
    ids: &[String],
    scores: &HashMap<String, f32>,
) -> Result<Vec<ResultDocument>> {
    let mut documents = Vec::new();
    for id in ids {
        match store.find_by_entity_type_and_id(entity_type, id).await? {
            Some(record) => {
                let metadata = record
                    .metadata
                    .as_deref()
                    .and_then(|blob| serde_json::from_str(blob).ok())
                    .unwrap_or_else(|| json!({}));
                documents.push(ResultDocument {
                    id: record.entity_id,
                    content: record.content,
                    metadata,
                    score: scores.get(id).copied(),
                });
            }
            None => {
                tracing::debug!("Dropping id {}: no longer present in the entity store", id);
            }
        }
    }
    Ok(documents)
}
