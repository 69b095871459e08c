pub mod validate;

pub use validate::PlanValidator;

use crate::cache::QueryCache;
use crate::llm::LLMClient;
use crate::metrics::QueryMetrics;
use crate::registry::EntityRegistry;
use crate::schema::SchemaDescriber;
use anyhow::Result;
use relata_common::{fingerprint, FilterCondition, QueryError, RelationshipPath, RelationshipQueryPlan};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Confidence assigned to the degraded plan used when generation fails.
const FALLBACK_PLAN_CONFIDENCE: f32 = 0.1;

/// Shape the generation backend is asked to produce. `original_query` is
/// supplied by us, everything else defaults when the model omits it, and
/// unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    #[serde(default)]
    semantic_query: Option<String>,
    primary_entity_type: String,
    #[serde(default)]
    candidate_entity_types: Vec<String>,
    #[serde(default)]
    relationship_paths: Vec<RelationshipPath>,
    #[serde(default)]
    direct_filters: BTreeMap<String, Vec<FilterCondition>>,
    #[serde(default)]
    relationship_filters: BTreeMap<String, Vec<FilterCondition>>,
    #[serde(default)]
    needs_semantic_search: bool,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Turns (query text, candidate entity types) into a validated
/// [`RelationshipQueryPlan`], with caching and graceful degradation when the
/// generation backend fails or cannot be reached.
pub struct QueryPlanner {
    llm: Option<Arc<dyn LLMClient>>,
    registry: Arc<EntityRegistry>,
    cache: Arc<QueryCache>,
    metrics: Arc<QueryMetrics>,
}

impl QueryPlanner {
    pub fn new(
        llm: Option<Arc<dyn LLMClient>>,
        registry: Arc<EntityRegistry>,
        cache: Arc<QueryCache>,
        metrics: Arc<QueryMetrics>,
    ) -> Self {
        if llm.is_none() {
            tracing::warn!(
                "QueryPlanner initialized without a generation backend; \
                 every plan will use the degraded fallback shape"
            );
        }
        Self {
            llm,
            registry,
            cache,
            metrics,
        }
    }

    pub async fn plan_query(
        &self,
        text: &str,
        candidate_types: &[String],
    ) -> Result<RelationshipQueryPlan> {
        if candidate_types.is_empty() {
            return Err(QueryError::Validation(
                "at least one candidate entity type is required".to_string(),
            )
            .into());
        }

        let started = Instant::now();
        let fp = fingerprint(text, candidate_types);

        if let Some(cached) = self.cache.get_plan(&fp).await {
            self.metrics
                .record_plan(started.elapsed().as_millis() as u64, true, true);
            return Ok(cached);
        }

        let (plan, generation_succeeded) = self.generate_plan(text, candidate_types).await;

        // Validation failures are never absorbed: an invalid plan must not
        // reach query compilation.
        PlanValidator::validate(&plan, &self.registry)?;

        self.cache.put_plan(fp, plan.clone()).await;
        self.metrics.record_plan(
            started.elapsed().as_millis() as u64,
            false,
            generation_succeeded,
        );

        Ok(plan)
    }

    async fn generate_plan(
        &self,
        text: &str,
        candidate_types: &[String],
    ) -> (RelationshipQueryPlan, bool) {
        let client = match &self.llm {
            Some(c) => c,
            None => return (self.fallback_plan(text, candidate_types), false),
        };

        let prompt = self.build_prompt(text, candidate_types);

        let raw = match client.generate(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Plan generation failed: {:?}. Using fallback plan.", e);
                return (self.fallback_plan(text, candidate_types), false);
            }
        };

        let clean_json = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        match serde_json::from_str::<GeneratedPlan>(clean_json) {
            Ok(generated) => (self.assemble_plan(text, generated), true),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse generated plan: {:?}. Raw response: {}. Using fallback plan.",
                    e,
                    clean_json
                );
                (self.fallback_plan(text, candidate_types), false)
            }
        }
    }

    fn assemble_plan(&self, text: &str, generated: GeneratedPlan) -> RelationshipQueryPlan {
        RelationshipQueryPlan {
            original_query: text.to_string(),
            semantic_query: generated.semantic_query,
            primary_entity_type: generated.primary_entity_type,
            candidate_entity_types: dedup_preserving_order(generated.candidate_entity_types),
            relationship_paths: generated.relationship_paths,
            direct_filters: generated.direct_filters,
            relationship_filters: generated.relationship_filters,
            needs_semantic_search: generated.needs_semantic_search,
            confidence: generated.confidence,
            limit: generated.limit,
        }
    }

    /// Degraded plan when generation fails or no backend exists: scope to the
    /// first candidate, keep every candidate, lean on semantic search.
    fn fallback_plan(&self, text: &str, candidate_types: &[String]) -> RelationshipQueryPlan {
        RelationshipQueryPlan {
            original_query: text.to_string(),
            semantic_query: Some(text.to_string()),
            primary_entity_type: candidate_types[0].clone(),
            candidate_entity_types: dedup_preserving_order(candidate_types.to_vec()),
            relationship_paths: Vec::new(),
            direct_filters: BTreeMap::new(),
            relationship_filters: BTreeMap::new(),
            needs_semantic_search: true,
            confidence: Some(FALLBACK_PLAN_CONFIDENCE),
            limit: None,
        }
    }

    fn build_prompt(&self, text: &str, candidate_types: &[String]) -> String {
        let schema = SchemaDescriber::describe(&self.registry, candidate_types);

        let instructions = "You are a query planner for a relational entity store. \
            Translate the user's natural-language question into a structured query plan \
            against the schema below. Use only the entity types and relationships listed. \
            \
            Output ONLY valid JSON with this shape: \
            {\"primary_entity_type\": \"...\", \
             \"candidate_entity_types\": [\"...\"], \
             \"semantic_query\": \"search phrase or null\", \
             \"relationship_paths\": [{\"from_entity_type\": \"...\", \"relationship_type\": \"field name\", \"to_entity_type\": \"...\", \"optional\": false, \"conditions\": []}], \
             \"direct_filters\": {\"entity_type\": [{\"field\": \"...\", \"operator\": \"EQUALS|ILIKE|GREATER_THAN|LESS_THAN\", \"value\": \"...\"}]}, \
             \"relationship_filters\": {}, \
             \"needs_semantic_search\": false, \
             \"confidence\": 0.9, \
             \"limit\": null} \
            \
            Set needs_semantic_search=true only when structured filters alone cannot \
            capture the question. Lowercase ILIKE values and wrap them in % wildcards.";

        format!(
            "{}\n\nSchema:\n{}\nQuestion: {}",
            instructions, schema, text
        )
    }
}

fn dedup_preserving_order(types: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    types.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
