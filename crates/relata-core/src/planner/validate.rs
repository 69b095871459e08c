use crate::registry::EntityRegistry;
use anyhow::Result;
use relata_common::{QueryError, RelationshipQueryPlan};

/// Verifies that a plan only references registered entities and
/// relationships. Problems are collected so the error names everything wrong
/// with the plan at once.
pub struct PlanValidator;

impl PlanValidator {
    pub fn validate(plan: &RelationshipQueryPlan, registry: &EntityRegistry) -> Result<()> {
        let mut problems = Vec::new();

        if !registry.is_entity_registered(&plan.primary_entity_type) {
            problems.push(format!(
                "primary entity type '{}' is not registered",
                plan.primary_entity_type
            ));
        }

        for candidate in &plan.candidate_entity_types {
            if !registry.is_entity_registered(candidate) {
                problems.push(format!("candidate entity type '{}' is not registered", candidate));
            }
        }

        for path in &plan.relationship_paths {
            for endpoint in [&path.from_entity_type, &path.to_entity_type] {
                if !registry.is_entity_registered(endpoint) {
                    problems.push(format!(
                        "path {}->{} references unregistered entity type '{}'",
                        path.from_entity_type, path.to_entity_type, endpoint
                    ));
                }
            }
            match registry.relationship(&path.from_entity_type, &path.to_entity_type) {
                None => problems.push(format!(
                    "no relationship registered between '{}' and '{}'",
                    path.from_entity_type, path.to_entity_type
                )),
                Some(rel) if rel.field_name != path.relationship_type => problems.push(format!(
                    "relationship {}->{} is named '{}', plan uses '{}'",
                    path.from_entity_type, path.to_entity_type, rel.field_name, path.relationship_type
                )),
                Some(_) => {}
            }
        }

        for entity_type in plan.direct_filters.keys().chain(plan.relationship_filters.keys()) {
            if !registry.is_entity_registered(entity_type) {
                problems.push(format!(
                    "filter references unregistered entity type '{}'",
                    entity_type
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(QueryError::Validation(problems.join("; ")).into())
        }
    }
}
