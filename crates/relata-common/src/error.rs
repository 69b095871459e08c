use crate::RelationshipQueryPlan;
use std::collections::HashMap;
use thiserror::Error;

/// Stage tag carried by the chain-exhausted error.
pub const FALLBACK_CHAIN_EXHAUSTED: &str = "FALLBACK_CHAIN_EXHAUSTED";

#[derive(Debug, Error)]
pub enum QueryError {
    /// Registry or builder misconfiguration: duplicate divergent entity
    /// registration, unregistered relationship endpoints, a plan path whose
    /// relationship was never registered.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The plan references entities or relationships the registry does not
    /// know about. Never absorbed: the plan must not reach compilation.
    #[error("plan validation failed: {0}")]
    Validation(String),

    /// Every fallback stage was attempted (or disabled) and produced nothing.
    /// Terminal; deliberately not an empty success.
    #[error("fallback chain exhausted for query '{}' ({} stages attempted)", plan.original_query, attempts.len())]
    FallbackChainExhausted {
        /// Always [`FALLBACK_CHAIN_EXHAUSTED`].
        stage: &'static str,
        plan: Box<RelationshipQueryPlan>,
        /// Attempt count per stage name.
        attempts: HashMap<String, u32>,
    },
}

impl QueryError {
    pub fn chain_exhausted(plan: RelationshipQueryPlan, attempts: HashMap<String, u32>) -> Self {
        QueryError::FallbackChainExhausted {
            stage: FALLBACK_CHAIN_EXHAUSTED,
            plan: Box::new(plan),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> RelationshipQueryPlan {
        serde_json::from_str(r#"{"original_query":"q","primary_entity_type":"document"}"#)
            .expect("plan")
    }

    #[test]
    fn test_chain_exhausted_carries_context() {
        let mut attempts = HashMap::new();
        attempts.insert("FALLBACK_METADATA".to_string(), 1);
        attempts.insert("FALLBACK_SIMPLE".to_string(), 1);

        let err = QueryError::chain_exhausted(plan(), attempts);
        match &err {
            QueryError::FallbackChainExhausted { stage, plan, attempts } => {
                assert_eq!(*stage, FALLBACK_CHAIN_EXHAUSTED);
                assert_eq!(plan.primary_entity_type, "document");
                assert_eq!(attempts.get("FALLBACK_METADATA"), Some(&1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("fallback chain exhausted"));
    }

    #[test]
    fn test_configuration_error_display() {
        let err = QueryError::Configuration("entity type 'user' already mapped".into());
        assert!(err.to_string().starts_with("configuration error"));
    }
}
