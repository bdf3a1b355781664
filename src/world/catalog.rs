//! Entity catalog: known types and the properties each may carry

use crate::world::snapshot::Snapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Mapping of entity type to its known property names
///
/// Built from the initial world and any explicit declarations, then widened
/// by the validator with whatever `spawn` and `transform` actions introduce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityCatalog {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of every type and property present in a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut catalog = Self::new();
        for entity in snapshot.entities() {
            catalog.declare_type(&entity.entity_type);
            for name in entity.properties.keys() {
                catalog.declare_property(&entity.entity_type, name);
            }
        }
        catalog
    }

    pub fn declare_type(&mut self, entity_type: &str) {
        self.types.entry(entity_type.to_string()).or_default();
    }

    pub fn declare_property(&mut self, entity_type: &str, property: &str) {
        self.types
            .entry(entity_type.to_string())
            .or_default()
            .insert(property.to_string());
    }

    pub fn has_type(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    /// Whether any type carries `property`
    pub fn has_property(&self, property: &str) -> bool {
        self.types.values().any(|props| props.contains(property))
    }

    pub fn type_has_property(&self, entity_type: &str, property: &str) -> bool {
        self.types
            .get(entity_type)
            .is_some_and(|props| props.contains(property))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_accumulate() {
        let mut catalog = EntityCatalog::new();
        catalog.declare_type("wall");
        catalog.declare_property("player", "moves");
        assert!(catalog.has_type("wall"));
        assert!(catalog.has_type("player"));
        assert!(catalog.has_property("moves"));
        assert!(catalog.type_has_property("player", "moves"));
        assert!(!catalog.type_has_property("wall", "moves"));
        assert_eq!(catalog.types().collect::<Vec<_>>(), vec!["player", "wall"]);
    }
}
