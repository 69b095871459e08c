pub mod metadata;
pub mod relational;

pub use metadata::MetadataTraversal;
pub use relational::RelationalTraversal;

use anyhow::Result;
use async_trait::async_trait;
use relata_common::{CompiledQuery, RelationshipQueryPlan};

/// Shared contract for executing a plan against some data source and yielding
/// ordered entity identifiers, bounded by the compiled query's limit when one
/// is present.
#[async_trait]
pub trait TraversalStrategy: Send + Sync {
    async fn traverse(
        &self,
        plan: &RelationshipQueryPlan,
        compiled: Option<&CompiledQuery>,
    ) -> Result<Vec<String>>;
}
