use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

pub mod config;
pub mod error;

pub use error::QueryError;

/// Logical entity type bound to its underlying class/table identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityMapping {
    pub entity_type: String,
    pub class_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationDirection {
    Forward,
    Reverse,
}

/// Named relationship between two registered entity types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipMapping {
    pub from_entity_type: String,
    pub to_entity_type: String,
    pub field_name: String,
    pub direction: RelationDirection,
    /// True when the relationship resolves to a collection on the owning side.
    pub many: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equals,
    Ilike,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipPath {
    pub from_entity_type: String,
    /// Matches a registered relationship's field name.
    pub relationship_type: String,
    pub to_entity_type: String,
    /// Outer join when true.
    #[serde(default)]
    pub optional: bool,
    /// Conditions scoped to the joined entity.
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

/// Structured representation of a natural-language query's intended entity
/// scope, joins and filters. Produced by the planner, consumed by the builder
/// and the fallback chain. Unknown fields from the generation backend are
/// ignored; missing optional fields default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipQueryPlan {
    pub original_query: String,
    #[serde(default)]
    pub semantic_query: Option<String>,
    pub primary_entity_type: String,
    #[serde(default)]
    pub candidate_entity_types: Vec<String>,
    #[serde(default)]
    pub relationship_paths: Vec<RelationshipPath>,
    #[serde(default)]
    pub direct_filters: BTreeMap<String, Vec<FilterCondition>>,
    #[serde(default)]
    pub relationship_filters: BTreeMap<String, Vec<FilterCondition>>,
    #[serde(default)]
    pub needs_semantic_search: bool,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl RelationshipQueryPlan {
    /// Text to embed when semantic search is requested.
    pub fn semantic_text(&self) -> &str {
        self.semantic_query.as_deref().unwrap_or(&self.original_query)
    }
}

/// Native query text plus ordered named parameters and an optional row limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    /// Ordered `(name, value)` pairs, numbered `p1..pN`.
    pub params: Vec<(String, serde_json::Value)>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStage {
    FallbackMetadata,
    FallbackVector,
    FallbackSimple,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::FallbackMetadata => "FALLBACK_METADATA",
            ExecutionStage::FallbackVector => "FALLBACK_VECTOR",
            ExecutionStage::FallbackSimple => "FALLBACK_SIMPLE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultDocument {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Outcome of one query invocation. A missing `execution_stage` means the
/// primary path produced the documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub documents: Vec<ResultDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_stage: Option<ExecutionStage>,
    pub hybrid_search_used: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionResult {
    pub fn primary(documents: Vec<ResultDocument>, hybrid_search_used: bool) -> Self {
        Self {
            documents,
            execution_stage: None,
            hybrid_search_used,
            metadata: HashMap::new(),
        }
    }

    pub fn fallback(documents: Vec<ResultDocument>, stage: ExecutionStage) -> Self {
        Self {
            documents,
            execution_stage: Some(stage),
            hybrid_search_used: false,
            metadata: HashMap::new(),
        }
    }
}

/// Entity record as returned by the metadata store: content text plus a raw
/// metadata blob that stays opaque until parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub content: String,
    pub metadata: Option<String>,
}

/// Deterministic cache key over the planning/execution inputs.
pub fn fingerprint(query: &str, candidate_types: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    for t in candidate_types {
        hasher.update([0x1f]);
        hasher.update(t.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
