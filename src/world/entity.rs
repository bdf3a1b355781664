//! Entities placed on the grid

use crate::core::types::{EntityId, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property that marks an entity as non-blocking when set to `false`
pub const BLOCKING_PROPERTY: &str = "blocking";

/// Typed property value
///
/// Numbers are integers only; a fractional JSON number fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl PropertyValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            PropertyValue::Bool(b) => *b,
            PropertyValue::Int(n) => *n != 0,
            PropertyValue::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(n) => write!(f, "{}", n),
            PropertyValue::Str(s) => write!(f, "'{}'", s),
        }
    }
}

/// A typed object on the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub position: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, entity_type: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            position,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn int_property(&self, name: &str) -> Option<i64> {
        self.property(name).and_then(PropertyValue::as_int)
    }

    /// Whether this entity occupies its cell exclusively
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self.property(BLOCKING_PROPERTY),
            Some(PropertyValue::Bool(false))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_block_by_default() {
        let wall_item = Entity::new("crate", "box", Position::new(1, 1));
        assert!(wall_item.is_blocking());

        let food = Entity::new("food", "food", Position::new(1, 1))
            .with_property("blocking", PropertyValue::Bool(false));
        assert!(!food.is_blocking());
    }

    #[test]
    fn test_property_values_decode() {
        let entity: Entity = serde_json::from_str(
            r#"{"id": "p", "type": "player", "position": [1, 2],
                "properties": {"moves": 3, "name": "bob", "alive": true}}"#,
        )
        .unwrap();
        assert_eq!(entity.int_property("moves"), Some(3));
        assert_eq!(entity.property("name"), Some(&PropertyValue::Str("bob".into())));
        assert_eq!(entity.property("alive"), Some(&PropertyValue::Bool(true)));
        assert_eq!(entity.position, Position::new(1, 2));
    }

    #[test]
    fn test_fractional_numbers_rejected() {
        let result: Result<PropertyValue, _> = serde_json::from_str("1.5");
        assert!(result.is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(PropertyValue::Int(2).is_truthy());
        assert!(!PropertyValue::Int(0).is_truthy());
        assert!(!PropertyValue::Str(String::new()).is_truthy());
    }
}
