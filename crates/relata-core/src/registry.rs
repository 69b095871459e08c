use anyhow::Result;
use dashmap::DashMap;
use relata_common::{EntityMapping, QueryError, RelationDirection, RelationshipMapping};

/// Process-wide map of logical entity types to underlying classes and of
/// named relationships between them. Populated once at startup, read
/// concurrently afterwards; append-only for the process lifetime.
pub struct EntityRegistry {
    entities: DashMap<String, String>,
    relationships: DashMap<(String, String), RelationshipMapping>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            relationships: DashMap::new(),
        }
    }

    /// Idempotent for an identical re-registration; re-registering the same
    /// type with a different class is a configuration error.
    pub fn register_entity_type(&self, entity_type: &str, class_name: &str) -> Result<()> {
        if let Some(existing) = self.entities.get(entity_type) {
            if existing.value() == class_name {
                return Ok(());
            }
            return Err(QueryError::Configuration(format!(
                "entity type '{}' already mapped to class '{}', refusing remap to '{}'",
                entity_type,
                existing.value(),
                class_name
            ))
            .into());
        }
        self.entities
            .insert(entity_type.to_string(), class_name.to_string());
        tracing::info!("Registered entity type '{}' -> {}", entity_type, class_name);
        Ok(())
    }

    /// Both endpoints must already be registered.
    pub fn register_relationship(
        &self,
        from: &str,
        to: &str,
        field_name: &str,
        direction: RelationDirection,
        many: bool,
    ) -> Result<()> {
        for endpoint in [from, to] {
            if !self.entities.contains_key(endpoint) {
                return Err(QueryError::Configuration(format!(
                    "cannot register relationship {}->{}: entity type '{}' is not registered",
                    from, to, endpoint
                ))
                .into());
            }
        }
        let mapping = RelationshipMapping {
            from_entity_type: from.to_string(),
            to_entity_type: to.to_string(),
            field_name: field_name.to_string(),
            direction,
            many,
        };
        self.relationships
            .insert((from.to_string(), to.to_string()), mapping);
        tracing::info!("Registered relationship {} -> {} via '{}'", from, to, field_name);
        Ok(())
    }

    pub fn is_entity_registered(&self, entity_type: &str) -> bool {
        self.entities.contains_key(entity_type)
    }

    pub fn class_name(&self, entity_type: &str) -> Option<String> {
        self.entities.get(entity_type).map(|e| e.value().clone())
    }

    pub fn relationship(&self, from: &str, to: &str) -> Option<RelationshipMapping> {
        self.relationships
            .get(&(from.to_string(), to.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn relationship_field_name(&self, from: &str, to: &str) -> Option<String> {
        self.relationship(from, to).map(|r| r.field_name)
    }

    /// Snapshot of all entity mappings, sorted by entity type.
    pub fn all_entity_mappings(&self) -> Vec<EntityMapping> {
        let mut mappings: Vec<EntityMapping> = self
            .entities
            .iter()
            .map(|e| EntityMapping {
                entity_type: e.key().clone(),
                class_name: e.value().clone(),
            })
            .collect();
        mappings.sort_by(|a, b| a.entity_type.cmp(&b.entity_type));
        mappings
    }

    /// Snapshot of all relationship mappings, sorted by endpoint pair.
    pub fn all_relationship_mappings(&self) -> Vec<RelationshipMapping> {
        let mut mappings: Vec<RelationshipMapping> = self
            .relationships
            .iter()
            .map(|r| r.value().clone())
            .collect();
        mappings.sort_by(|a, b| {
            (a.from_entity_type.as_str(), a.to_entity_type.as_str())
                .cmp(&(b.from_entity_type.as_str(), b.to_entity_type.as_str()))
        });
        mappings
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_reregistration_is_noop() {
        let registry = EntityRegistry::new();
        registry.register_entity_type("document", "Document").unwrap();
        registry.register_entity_type("document", "Document").unwrap();

        assert_eq!(registry.all_entity_mappings().len(), 1);
    }

    #[test]
    fn test_divergent_reregistration_errors() {
        let registry = EntityRegistry::new();
        registry.register_entity_type("document", "Document").unwrap();

        let err = registry
            .register_entity_type("document", "LegacyDocument")
            .unwrap_err();
        let qe = err.downcast_ref::<QueryError>().expect("typed error");
        assert!(matches!(qe, QueryError::Configuration(_)));
        assert!(err.to_string().contains("already mapped"));
    }

    #[test]
    fn test_relationship_requires_registered_endpoints() {
        let registry = EntityRegistry::new();
        registry.register_entity_type("document", "Document").unwrap();

        let err = registry
            .register_relationship("document", "user", "createdBy", RelationDirection::Forward, false)
            .unwrap_err();
        assert!(err.to_string().contains("'user' is not registered"));

        registry.register_entity_type("user", "User").unwrap();
        registry
            .register_relationship("document", "user", "createdBy", RelationDirection::Forward, false)
            .unwrap();

        assert_eq!(
            registry.relationship_field_name("document", "user").as_deref(),
            Some("createdBy")
        );
    }

    #[test]
    fn test_snapshots_are_sorted() {
        let registry = EntityRegistry::new();
        registry.register_entity_type("user", "User").unwrap();
        registry.register_entity_type("document", "Document").unwrap();
        registry.register_entity_type("approval", "Approval").unwrap();
        registry
            .register_relationship("user", "document", "documents", RelationDirection::Reverse, true)
            .unwrap();
        registry
            .register_relationship("document", "user", "createdBy", RelationDirection::Forward, false)
            .unwrap();

        let entities: Vec<_> = registry
            .all_entity_mappings()
            .into_iter()
            .map(|m| m.entity_type)
            .collect();
        assert_eq!(entities, vec!["approval", "document", "user"]);

        let rels = registry.all_relationship_mappings();
        assert_eq!(rels[0].from_entity_type, "document");
        assert_eq!(rels[1].from_entity_type, "user");
    }
}
