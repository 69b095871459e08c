use super::TraversalStrategy;
use crate::backend::EntityStore;
use anyhow::Result;
use async_trait::async_trait;
use relata_common::{CompiledQuery, FilterCondition, FilterOperator, RelationshipQueryPlan};
use std::sync::Arc;

/// Filters cached entity metadata blobs in-process instead of querying the
/// relational engine. Records with missing or unparseable metadata are
/// skipped, never raised: fail-open at the record level.
pub struct MetadataTraversal {
    store: Arc<dyn EntityStore>,
}

impl MetadataTraversal {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Merged filter view: the primary type's direct filters on top-level
    /// metadata fields, plus each path's conditions through the dotted path
    /// implied by the relationship field (e.g. `createdBy.status`).
    fn merged_filters(plan: &RelationshipQueryPlan) -> Vec<(String, FilterCondition)> {
        let mut filters = Vec::new();

        if let Some(conditions) = plan.direct_filters.get(&plan.primary_entity_type) {
            for condition in conditions {
                filters.push((condition.field.clone(), condition.clone()));
            }
        }

        for path in &plan.relationship_paths {
            for condition in &path.conditions {
                filters.push((
                    format!("{}.{}", path.relationship_type, condition.field),
                    condition.clone(),
                ));
            }
        }

        filters
    }
}

#[async_trait]
impl TraversalStrategy for MetadataTraversal {
    async fn traverse(
        &self,
        plan: &RelationshipQueryPlan,
        compiled: Option<&CompiledQuery>,
    ) -> Result<Vec<String>> {
        let records = self.store.find_by_entity_type(&plan.primary_entity_type).await?;
        let filters = Self::merged_filters(plan);

        let mut ids = Vec::new();
        for record in records {
            let blob = match record.metadata.as_deref() {
                Some(b) if !b.trim().is_empty() => b,
                _ => {
                    tracing::debug!("Skipping entity {}: blank metadata", record.entity_id);
                    continue;
                }
            };
            let metadata: serde_json::Value = match serde_json::from_str(blob) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("Skipping entity {}: unparseable metadata ({})", record.entity_id, e);
                    continue;
                }
            };

            let matches = filters
                .iter()
                .all(|(path, condition)| condition_matches(&metadata, path, condition));
            if matches {
                ids.push(record.entity_id);
            }
        }

        // Natural store enumeration order is preserved; only truncate.
        if let Some(limit) = compiled.and_then(|c| c.limit) {
            ids.truncate(limit);
        }

        Ok(ids)
    }
}

fn condition_matches(metadata: &serde_json::Value, path: &str, condition: &FilterCondition) -> bool {
    let Some(actual) = lookup_path(metadata, path) else {
        return false;
    };

    match condition.operator {
        FilterOperator::Equals => value_text(actual) == value_text(&condition.value),
        FilterOperator::Ilike => {
            let needle = value_text(&condition.value).replace('%', "").to_lowercase();
            value_text(actual).to_lowercase().contains(&needle)
        }
        FilterOperator::GreaterThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        FilterOperator::LessThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
    }
}

fn lookup_path<'a>(metadata: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = metadata;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
