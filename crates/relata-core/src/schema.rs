use crate::registry::EntityRegistry;

/// Renders a textual schema summary for a set of candidate entity types,
/// consumed as planning context by the generation prompt.
pub struct SchemaDescriber;

impl SchemaDescriber {
    /// One block per candidate: the backing class plus every registered
    /// relationship whose source is that candidate. Unregistered candidates
    /// are listed as such so the model does not invent joins for them.
    pub fn describe(registry: &EntityRegistry, candidate_types: &[String]) -> String {
        let mut out = String::new();
        for entity_type in candidate_types {
            match registry.class_name(entity_type) {
                Some(class_name) => {
                    out.push_str(&format!("Entity '{}' (class {})\n", entity_type, class_name));
                    for rel in registry.all_relationship_mappings() {
                        if rel.from_entity_type != *entity_type {
                            continue;
                        }
                        out.push_str(&format!(
                            "  relationship '{}' -> {} ({:?}, {})\n",
                            rel.field_name,
                            rel.to_entity_type,
                            rel.direction,
                            if rel.many { "many" } else { "single" },
                        ));
                    }
                }
                None => {
                    out.push_str(&format!("Entity '{}' (unregistered)\n", entity_type));
                }
            }
        }
        out
    }
}
