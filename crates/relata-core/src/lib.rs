pub mod backend;
pub mod builder;
pub mod cache;
pub mod executor;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod schema;
pub mod traversal;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::QueryBuilder;
pub use cache::{CacheConfig, QueryCache};
pub use executor::HybridQueryExecutor;
pub use llm::{LLMClient, OpenAIClient};
pub use metrics::QueryMetrics;
pub use orchestrator::ReliabilityOrchestrator;
pub use planner::QueryPlanner;
pub use registry::EntityRegistry;

// Re-export common types for convenience
pub use relata_common::{
    CompiledQuery, ExecutionResult, ExecutionStage, FilterCondition, FilterOperator,
    QueryError, RelationshipPath, RelationshipQueryPlan, ResultDocument,
};
