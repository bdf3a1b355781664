//! JSON world documents
//!
//! A `Document` is the serialized description of an environment: grid,
//! entities, rule definitions and victory/failure predicates. Building the
//! world model from it checks every world invariant, so a corrupted document
//! is rejected as a whole.

use crate::core::error::LoadError;
use crate::core::types::{EntityId, Position};
use crate::rules::definition::{PredicateDef, RuleDef};
use crate::world::catalog::EntityCatalog;
use crate::world::entity::{Entity, PropertyValue};
use crate::world::grid::Grid;
use crate::world::snapshot::Snapshot;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Character reserved for ids minted by `spawn`
pub const SPAWN_ID_SEPARATOR: char = '#';

/// Entity type chosen as the player when a document names none
pub const DEFAULT_PLAYER_TYPE: &str = "player";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Entity as written in a document; the id is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub position: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Older layout nesting the world under `initial_state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialState {
    #[serde(default)]
    pub grid: Option<Grid>,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

/// A complete environment document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Grid>,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<InitialState>,
    /// Optional catalog declarations: type to property names
    #[serde(default)]
    pub entity_types: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<EntityId>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    #[serde(default)]
    pub victory_conditions: Vec<PredicateDef>,
    #[serde(default)]
    pub failure_conditions: Vec<PredicateDef>,
}

/// World model built from a document
#[derive(Debug, Clone)]
pub struct LoadedWorld {
    pub snapshot: Snapshot,
    pub catalog: EntityCatalog,
    pub player: Option<EntityId>,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn grid(&self) -> Option<&Grid> {
        self.grid
            .as_ref()
            .or_else(|| self.initial_state.as_ref().and_then(|s| s.grid.as_ref()))
    }

    fn entity_defs(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities
            .iter()
            .chain(self.initial_state.iter().flat_map(|s| s.entities.iter()))
    }

    /// Build the initial snapshot, entity catalog and player id
    pub fn build_world(&self) -> Result<LoadedWorld, LoadError> {
        let grid = self.grid().cloned().ok_or(LoadError::MissingGrid)?;
        let entities = self.resolve_entities()?;
        let snapshot = Snapshot::from_parts(grid, entities, 0, 0)?;

        let mut catalog = EntityCatalog::from_snapshot(&snapshot);
        for (entity_type, properties) in &self.entity_types {
            catalog.declare_type(entity_type);
            for property in properties {
                catalog.declare_property(entity_type, property);
            }
        }

        let player = match &self.player {
            Some(id) if snapshot.entity(id).is_some() => Some(id.clone()),
            Some(id) => return Err(LoadError::UnknownPlayer(id.clone())),
            None => snapshot
                .entities_of_type(DEFAULT_PLAYER_TYPE)
                .next()
                .map(|e| e.id.clone()),
        };

        Ok(LoadedWorld {
            snapshot,
            catalog,
            player,
        })
    }

    /// Assign `<type>_<n>` ids to anonymous entities, skipping taken ids
    fn resolve_entities(&self) -> Result<Vec<Entity>, LoadError> {
        let mut taken: AHashSet<&str> = AHashSet::new();
        for def in self.entity_defs() {
            if let Some(id) = &def.id {
                if id.as_str().contains(SPAWN_ID_SEPARATOR) {
                    return Err(LoadError::ReservedId(id.clone()));
                }
                taken.insert(id.as_str());
            }
        }

        let mut counters: AHashMap<&str, u64> = AHashMap::new();
        let mut minted: AHashSet<String> = AHashSet::new();
        let mut entities = Vec::new();
        for def in self.entity_defs() {
            let id = match &def.id {
                Some(id) => id.clone(),
                None => {
                    let counter = counters.entry(def.entity_type.as_str()).or_insert(0);
                    loop {
                        *counter += 1;
                        let candidate = format!("{}_{}", def.entity_type, counter);
                        if !taken.contains(candidate.as_str()) && !minted.contains(&candidate) {
                            minted.insert(candidate.clone());
                            break EntityId::new(candidate);
                        }
                    }
                }
            };
            entities.push(Entity {
                id,
                entity_type: def.entity_type.clone(),
                position: def.position,
                properties: def.properties.clone(),
            });
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::snapshot::WorldError;

    const LEGACY: &str = r#"{
        "metadata": {"name": "Test", "description": "legacy layout"},
        "initial_state": {
            "grid": {"width": 5, "height": 5, "cells": [
                [1, 1, 1, 1, 1],
                [1, 0, 0, 0, 1],
                [1, 0, 2, 0, 1],
                [1, 0, 0, 0, 1],
                [1, 1, 1, 1, 1]
            ]},
            "entities": [
                {"id": "player", "type": "player", "position": [2, 2],
                 "properties": {"movable": true}}
            ]
        }
    }"#;

    #[test]
    fn test_legacy_layout_loads() {
        let doc = Document::from_json(LEGACY).unwrap();
        let world = doc.build_world().unwrap();
        assert_eq!(world.snapshot.len(), 1);
        assert_eq!(world.player, Some(EntityId::from("player")));
        assert!(world.catalog.type_has_property("player", "movable"));
        assert_eq!(doc.metadata.name, "Test");
    }

    #[test]
    fn test_anonymous_ids_generated() {
        let doc = Document::from_json(
            r#"{
            "grid": {"width": 4, "height": 4},
            "entities": [
                {"type": "key", "position": [0, 0]},
                {"id": "key_2", "type": "key", "position": [1, 0]},
                {"type": "key", "position": [2, 0]}
            ]
        }"#,
        )
        .unwrap();
        let world = doc.build_world().unwrap();
        let ids: Vec<_> = world.snapshot.entities().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, vec!["key_1", "key_2", "key_3"]);
    }

    #[test]
    fn test_reserved_id_rejected() {
        let doc = Document::from_json(
            r#"{"grid": {"width": 2, "height": 2},
                "entities": [{"id": "coin#1", "type": "coin", "position": [0, 0]}]}"#,
        )
        .unwrap();
        assert!(matches!(doc.build_world(), Err(LoadError::ReservedId(_))));
    }

    #[test]
    fn test_out_of_range_entity_rejected() {
        let doc = Document::from_json(
            r#"{"grid": {"width": 2, "height": 2},
                "entities": [{"id": "a", "type": "box", "position": [5, 0]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build_world(),
            Err(LoadError::World(WorldError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_missing_grid_rejected() {
        let doc = Document::from_json(r#"{"entities": []}"#).unwrap();
        assert!(matches!(doc.build_world(), Err(LoadError::MissingGrid)));
    }

    #[test]
    fn test_unknown_player_rejected() {
        let doc = Document::from_json(
            r#"{"grid": {"width": 2, "height": 2}, "player": "hero"}"#,
        )
        .unwrap();
        assert!(matches!(doc.build_world(), Err(LoadError::UnknownPlayer(_))));
    }

    #[test]
    fn test_declared_types_join_catalog() {
        let doc = Document::from_json(
            r#"{"grid": {"width": 2, "height": 2},
                "entity_types": {"coin": ["value"]}}"#,
        )
        .unwrap();
        let world = doc.build_world().unwrap();
        assert!(world.catalog.type_has_property("coin", "value"));
        assert_eq!(world.player, None);
    }
}
