use crate::registry::EntityRegistry;
use anyhow::Result;
use relata_common::{
    CompiledQuery, FilterCondition, FilterOperator, QueryError, RelationshipQueryPlan,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Compiles a validated plan into native query text, an ordered parameter
/// list and a row limit. Output is fully deterministic for a given plan:
/// joins in path order, then predicates in a fixed order (direct filters,
/// path conditions, relationship filters) numbered `p1..pN`.
pub struct QueryBuilder {
    registry: Arc<EntityRegistry>,
}

impl QueryBuilder {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    pub fn build(&self, plan: &RelationshipQueryPlan) -> Result<CompiledQuery> {
        let root_class = self
            .registry
            .class_name(&plan.primary_entity_type)
            .ok_or_else(|| {
                QueryError::Configuration(format!(
                    "primary entity type '{}' has no registered class",
                    plan.primary_entity_type
                ))
            })?;

        let mut text = format!("SELECT DISTINCT root FROM {} root", root_class);

        let mut aliases = AliasAllocator::new();
        // Alias per path, plus the first alias seen for each joined entity
        // type (relationship filters attach to that one).
        let mut path_aliases: Vec<String> = Vec::new();
        let mut first_alias_by_type: HashMap<String, String> = HashMap::new();

        for path in &plan.relationship_paths {
            // A path whose relationship is unregistered must fail loudly,
            // never be silently dropped.
            let relationship = self
                .registry
                .relationship(&path.from_entity_type, &path.to_entity_type)
                .ok_or_else(|| {
                    QueryError::Configuration(format!(
                        "no relationship registered for path {} -> {} (field '{}')",
                        path.from_entity_type, path.to_entity_type, path.relationship_type
                    ))
                })?;

            let owner = if path.from_entity_type == plan.primary_entity_type {
                "root".to_string()
            } else {
                first_alias_by_type
                    .get(&path.from_entity_type)
                    .cloned()
                    .ok_or_else(|| {
                        QueryError::Configuration(format!(
                            "path starts at '{}' which is neither the primary entity nor a previously joined type",
                            path.from_entity_type
                        ))
                    })?
            };

            let alias = aliases.allocate(&path.to_entity_type);
            let join_kw = if path.optional { "LEFT JOIN" } else { "JOIN" };
            text.push_str(&format!(
                " {} {}.{} {}",
                join_kw, owner, relationship.field_name, alias
            ));

            first_alias_by_type
                .entry(path.to_entity_type.clone())
                .or_insert_with(|| alias.clone());
            path_aliases.push(alias);
        }

        // Predicate assembly order is fixed and significant: direct filters,
        // then each path's own conditions, then relationship filters.
        let mut predicates: Vec<String> = Vec::new();
        let mut params: Vec<(String, serde_json::Value)> = Vec::new();

        for conditions in plan.direct_filters.values() {
            for condition in conditions {
                predicates.push(render_predicate("root", condition, &mut params));
            }
        }

        for (path, alias) in plan.relationship_paths.iter().zip(&path_aliases) {
            for condition in &path.conditions {
                predicates.push(render_predicate(alias, condition, &mut params));
            }
        }

        for (entity_type, conditions) in &plan.relationship_filters {
            let Some(alias) = first_alias_by_type.get(entity_type) else {
                tracing::debug!(
                    "Skipping relationship filters for '{}': no path joins that entity type",
                    entity_type
                );
                continue;
            };
            for condition in conditions {
                predicates.push(render_predicate(alias, condition, &mut params));
            }
        }

        if !predicates.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&predicates.join(" AND "));
        }

        Ok(CompiledQuery {
            text,
            params,
            limit: plan.limit,
        })
    }
}

fn render_predicate(
    alias: &str,
    condition: &FilterCondition,
    params: &mut Vec<(String, serde_json::Value)>,
) -> String {
    let name = format!("p{}", params.len() + 1);
    let rendered = match condition.operator {
        FilterOperator::Equals => format!("{}.{} = :{}", alias, condition.field, name),
        // Value assumed already case-normalized by the caller.
        FilterOperator::Ilike => format!("LOWER({}.{}) LIKE :{}", alias, condition.field, name),
        FilterOperator::GreaterThan => format!("{}.{} > :{}", alias, condition.field, name),
        FilterOperator::LessThan => format!("{}.{} < :{}", alias, condition.field, name),
    };
    params.push((name, condition.value.clone()));
    rendered
}

/// Short deterministic aliases: two-letter lowercase prefix of the entity
/// type plus a per-prefix counter, bumped past collisions.
struct AliasAllocator {
    counters: HashMap<String, usize>,
    used: std::collections::HashSet<String>,
}

impl AliasAllocator {
    fn new() -> Self {
        Self {
            counters: HashMap::new(),
            used: std::collections::HashSet::new(),
        }
    }

    fn allocate(&mut self, entity_type: &str) -> String {
        let prefix: String = entity_type
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(2)
            .collect::<String>()
            .to_lowercase();
        let prefix = if prefix.is_empty() { "x".to_string() } else { prefix };

        let counter = self.counters.entry(prefix.clone()).or_insert(0);
        loop {
            *counter += 1;
            let alias = format!("{}{}", prefix, counter);
            if self.used.insert(alias.clone()) {
                return alias;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relata_common::RelationDirection;
    use serde_json::json;

    fn registry() -> Arc<EntityRegistry> {
        let registry = EntityRegistry::new();
        registry.register_entity_type("document", "Document").unwrap();
        registry.register_entity_type("user", "User").unwrap();
        registry.register_entity_type("team", "Team").unwrap();
        registry
            .register_relationship("document", "user", "createdBy", RelationDirection::Forward, false)
            .unwrap();
        registry
            .register_relationship("user", "team", "team", RelationDirection::Forward, false)
            .unwrap();
        registry
            .register_relationship("document", "team", "ownerTeam", RelationDirection::Forward, false)
            .unwrap();
        Arc::new(registry)
    }

    fn plan(json: &str) -> RelationshipQueryPlan {
        serde_json::from_str(json).expect("plan json")
    }

    const FILTERED_JOIN_PLAN: &str = r#"{
        "original_query": "active documents and their creators",
        "primary_entity_type": "document",
        "candidate_entity_types": ["document", "user"],
        "relationship_paths": [{
            "from_entity_type": "document",
            "relationship_type": "createdBy",
            "to_entity_type": "user"
        }],
        "direct_filters": {"document": [{"field": "status", "operator": "EQUALS", "value": "ACTIVE"}]}
    }"#;

    #[test]
    fn test_root_join_and_direct_filter() {
        let compiled = QueryBuilder::new(registry()).build(&plan(FILTERED_JOIN_PLAN)).unwrap();

        assert!(compiled.text.contains("SELECT DISTINCT root FROM Document root"));
        assert!(compiled.text.contains("JOIN root.createdBy us1"));
        assert!(compiled.text.contains("root.status = :p1"));
        assert_eq!(compiled.params, vec![("p1".to_string(), json!("ACTIVE"))]);
        assert!(compiled.limit.is_none());
    }

    #[test]
    fn test_optional_path_renders_left_join() {
        let mut p = plan(FILTERED_JOIN_PLAN);
        p.relationship_paths[0].optional = true;

        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(compiled.text.contains("LEFT JOIN root.createdBy us1"));
        assert!(!compiled.text.contains("root JOIN"));
    }

    #[test]
    fn test_parameter_order_direct_before_relationship() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "relationship_paths": [{
                    "from_entity_type": "document",
                    "relationship_type": "createdBy",
                    "to_entity_type": "user"
                }],
                "relationship_filters": {"user": [{"field": "name", "operator": "ILIKE", "value": "%smith%"}]},
                "direct_filters": {"document": [{"field": "status", "operator": "EQUALS", "value": "ACTIVE"}]}
            }"#,
        );

        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(compiled.text.contains("root.status = :p1"));
        assert!(compiled.text.contains("LOWER(us1.name) LIKE :p2"));
        assert_eq!(
            compiled.params,
            vec![
                ("p1".to_string(), json!("ACTIVE")),
                ("p2".to_string(), json!("%smith%")),
            ]
        );
    }

    #[test]
    fn test_path_conditions_numbered_between() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "relationship_paths": [{
                    "from_entity_type": "document",
                    "relationship_type": "createdBy",
                    "to_entity_type": "user",
                    "conditions": [{"field": "status", "operator": "EQUALS", "value": "ENABLED"}]
                }],
                "relationship_filters": {"user": [{"field": "name", "operator": "ILIKE", "value": "%a%"}]},
                "direct_filters": {"document": [{"field": "status", "operator": "EQUALS", "value": "ACTIVE"}]}
            }"#,
        );

        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        let names: Vec<&str> = compiled.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "p3"]);
        assert!(compiled.text.contains("root.status = :p1"));
        assert!(compiled.text.contains("us1.status = :p2"));
        assert!(compiled.text.contains("LOWER(us1.name) LIKE :p3"));
    }

    #[test]
    fn test_where_omitted_without_predicates() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "relationship_paths": [{
                    "from_entity_type": "document",
                    "relationship_type": "createdBy",
                    "to_entity_type": "user"
                }]
            }"#,
        );
        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(!compiled.text.contains("WHERE"));
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_chained_paths_and_alias_counters() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "relationship_paths": [
                    {"from_entity_type": "document", "relationship_type": "createdBy", "to_entity_type": "user"},
                    {"from_entity_type": "user", "relationship_type": "team", "to_entity_type": "team"}
                ]
            }"#,
        );
        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(compiled.text.contains("JOIN root.createdBy us1"));
        // Second hop hangs off the first hop's alias, not root.
        assert!(compiled.text.contains("JOIN us1.team te1"));
    }

    #[test]
    fn test_unregistered_path_relationship_is_configuration_error() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "user",
                "relationship_paths": [{
                    "from_entity_type": "user",
                    "relationship_type": "documents",
                    "to_entity_type": "document"
                }]
            }"#,
        );
        let err = QueryBuilder::new(registry()).build(&p).unwrap_err();
        let qe = err.downcast_ref::<QueryError>().expect("typed error");
        assert!(matches!(qe, QueryError::Configuration(_)));
    }

    #[test]
    fn test_relationship_filter_without_join_is_skipped() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "relationship_filters": {"team": [{"field": "name", "operator": "EQUALS", "value": "core"}]}
            }"#,
        );
        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(!compiled.text.contains("WHERE"));
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_limit_passthrough() {
        let mut p = plan(FILTERED_JOIN_PLAN);
        p.limit = Some(25);
        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert_eq!(compiled.limit, Some(25));
    }

    #[test]
    fn test_comparison_operators_render() {
        let p = plan(
            r#"{
                "original_query": "q",
                "primary_entity_type": "document",
                "direct_filters": {"document": [
                    {"field": "version", "operator": "GREATER_THAN", "value": 3},
                    {"field": "size", "operator": "LESS_THAN", "value": 1000}
                ]}
            }"#,
        );
        let compiled = QueryBuilder::new(registry()).build(&p).unwrap();
        assert!(compiled.text.contains("root.version > :p1"));
        assert!(compiled.text.contains("root.size < :p2"));
    }
}
