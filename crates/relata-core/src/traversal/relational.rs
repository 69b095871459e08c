use super::TraversalStrategy;
use crate::backend::RelationalExecutor;
use anyhow::Result;
use async_trait::async_trait;
use relata_common::{CompiledQuery, RelationshipQueryPlan};
use std::sync::Arc;

/// Executes the compiled query against the relational store, preserving the
/// store-returned row order.
pub struct RelationalTraversal {
    executor: Arc<dyn RelationalExecutor>,
}

impl RelationalTraversal {
    pub fn new(executor: Arc<dyn RelationalExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TraversalStrategy for RelationalTraversal {
    async fn traverse(
        &self,
        _plan: &RelationshipQueryPlan,
        compiled: Option<&CompiledQuery>,
    ) -> Result<Vec<String>> {
        // No compiled query means nothing to run; the store is not contacted.
        let Some(query) = compiled else {
            return Ok(Vec::new());
        };

        // The limiting entry point is only used when a limit exists.
        let ids = match query.limit {
            Some(limit) => {
                self.executor
                    .execute_with_limit(&query.text, &query.params, limit)
                    .await?
            }
            None => self.executor.execute(&query.text, &query.params).await?,
        };

        tracing::debug!("Relational traversal returned {} ids", ids.len());
        Ok(ids)
    }
}
