//! Mutations: the unit of change a rule proposes and a commit applies

use crate::core::types::{EntityId, Position};
use crate::world::entity::{Entity, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Move,
    SetProperty,
    Spawn,
    Destroy,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MutationKind::Move => "move",
            MutationKind::SetProperty => "set_property",
            MutationKind::Spawn => "spawn",
            MutationKind::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Kind-specific payload, serialized as `mutation_kind` + `payload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mutation_kind", content = "payload", rename_all = "snake_case")]
pub enum MutationPayload {
    Move {
        from: Position,
        to: Position,
    },
    SetProperty {
        properties: BTreeMap<String, PropertyValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retype: Option<String>,
    },
    /// `entity.id` equals the mutation's `entity_id`
    Spawn {
        entity: Entity,
        serial: u64,
    },
    Destroy,
}

/// One proposed change to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub payload: MutationPayload,
}

impl Mutation {
    pub fn movement(entity_id: EntityId, from: Position, to: Position) -> Self {
        Self {
            entity_id,
            payload: MutationPayload::Move { from, to },
        }
    }

    pub fn destroy(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            payload: MutationPayload::Destroy,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self.payload {
            MutationPayload::Move { .. } => MutationKind::Move,
            MutationPayload::SetProperty { .. } => MutationKind::SetProperty,
            MutationPayload::Spawn { .. } => MutationKind::Spawn,
            MutationPayload::Destroy => MutationKind::Destroy,
        }
    }

    /// Cell this mutation puts an entity into, for moves and spawns
    pub fn destination(&self) -> Option<Position> {
        match &self.payload {
            MutationPayload::Move { to, .. } => Some(*to),
            MutationPayload::Spawn { entity, .. } => Some(entity.position),
            _ => None,
        }
    }
}
