//! World model snapshot: grid, entity table and cell index
//!
//! A snapshot is a value. The grid is shared between successive snapshots
//! behind an `Arc` since no rule can change cell codes; the entity table is
//! a `BTreeMap` so every iteration runs in id order.

use crate::core::types::{EntityId, Position, Tick};
use crate::world::entity::Entity;
use crate::world::grid::Grid;
use ahash::AHashMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Violations of the world-model invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity '{id}' at {position} is outside the grid")]
    OutOfBounds { id: EntityId, position: Position },

    #[error("entity '{id}' at {position} sits on a wall")]
    OnWall { id: EntityId, position: Position },

    #[error("duplicate entity id '{0}'")]
    DuplicateId(EntityId),

    #[error("cell {position} holds two blocking entities ('{first}' and '{second}')")]
    CellOccupied {
        position: Position,
        first: EntityId,
        second: EntityId,
    },
}

/// Cell to entity ids, each list sorted by id
type CellIndex = AHashMap<Position, Vec<EntityId>>;

/// Complete world state at one tick boundary
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SnapshotRepr")]
pub struct Snapshot {
    grid: Arc<Grid>,
    entities: BTreeMap<EntityId, Entity>,
    tick: Tick,
    next_serial: u64,
    index: CellIndex,
}

#[derive(Deserialize)]
struct SnapshotRepr {
    grid: Grid,
    entities: Vec<Entity>,
    #[serde(default)]
    tick: Tick,
    #[serde(default)]
    next_serial: u64,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    grid: &'a Grid,
    entities: Vec<&'a Entity>,
    tick: Tick,
    next_serial: u64,
}

impl Snapshot {
    /// Build and check a snapshot from loose parts
    pub fn from_parts(
        grid: Grid,
        entities: impl IntoIterator<Item = Entity>,
        tick: Tick,
        next_serial: u64,
    ) -> Result<Self, WorldError> {
        let mut table = BTreeMap::new();
        for entity in entities {
            if table.contains_key(&entity.id) {
                return Err(WorldError::DuplicateId(entity.id));
            }
            table.insert(entity.id.clone(), entity);
        }
        Self::build(Arc::new(grid), table, tick, next_serial)
    }

    /// Next snapshot sharing this one's grid, one tick later
    pub(crate) fn successor(
        &self,
        entities: BTreeMap<EntityId, Entity>,
        next_serial: u64,
    ) -> Result<Self, WorldError> {
        self.rebuilt(entities, self.tick + 1, next_serial)
    }

    /// Snapshot sharing this one's grid with another entity table
    pub(crate) fn rebuilt(
        &self,
        entities: BTreeMap<EntityId, Entity>,
        tick: Tick,
        next_serial: u64,
    ) -> Result<Self, WorldError> {
        Self::build(Arc::clone(&self.grid), entities, tick, next_serial)
    }

    fn build(
        grid: Arc<Grid>,
        entities: BTreeMap<EntityId, Entity>,
        tick: Tick,
        next_serial: u64,
    ) -> Result<Self, WorldError> {
        let mut index: CellIndex = AHashMap::with_capacity(entities.len());
        for entity in entities.values() {
            index
                .entry(entity.position)
                .or_default()
                .push(entity.id.clone());
        }
        let snapshot = Self {
            grid,
            entities,
            tick,
            next_serial,
            index,
        };
        snapshot.check_invariants()?;
        Ok(snapshot)
    }

    /// Re-check bounds, walls and single blocking occupancy
    ///
    /// Entities are visited in id order, so the violation reported is the
    /// same on every run.
    pub fn check_invariants(&self) -> Result<(), WorldError> {
        let mut holders: AHashMap<Position, &EntityId> = AHashMap::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            if !self.grid.contains(entity.position) {
                return Err(WorldError::OutOfBounds {
                    id: entity.id.clone(),
                    position: entity.position,
                });
            }
            if self.grid.is_wall(entity.position) {
                return Err(WorldError::OnWall {
                    id: entity.id.clone(),
                    position: entity.position,
                });
            }
            if !entity.is_blocking() {
                continue;
            }
            if let Some(first) = holders.insert(entity.position, &entity.id) {
                return Err(WorldError::CellOccupied {
                    position: entity.position,
                    first: first.clone(),
                    second: entity.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Serial the next engine-spawned entity will receive
    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// All entities in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub(crate) fn entity_table(&self) -> &BTreeMap<EntityId, Entity> {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in a cell, in id order
    pub fn entities_at(&self, pos: Position) -> impl Iterator<Item = &Entity> {
        self.index
            .get(&pos)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id))
    }

    pub fn blocking_occupant(&self, pos: Position) -> Option<&Entity> {
        self.entities_at(pos).find(|e| e.is_blocking())
    }

    pub fn entities_of_type<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .values()
            .filter(move |e| e.entity_type == entity_type)
    }

    pub fn has_type_at(&self, entity_type: &str, pos: Position) -> bool {
        self.entities_at(pos).any(|e| e.entity_type == entity_type)
    }

    /// In-grid, not a wall, and holding no entity at all
    pub fn is_empty_cell(&self, pos: Position) -> bool {
        self.grid.contains(pos) && !self.grid.is_wall(pos) && self.entities_at(pos).next().is_none()
    }

    /// In-grid, not a wall, and free of blocking entities other than `ignoring`
    pub fn is_walkable(&self, pos: Position, ignoring: Option<&EntityId>) -> bool {
        self.grid.contains(pos)
            && !self.grid.is_wall(pos)
            && !self
                .entities_at(pos)
                .any(|e| e.is_blocking() && Some(&e.id) != ignoring)
    }

    /// Every empty cell in row-major order
    pub fn empty_cells(&self) -> Vec<Position> {
        self.grid
            .positions()
            .filter(|p| self.is_empty_cell(*p))
            .collect()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.next_serial == other.next_serial
            && self.entities == other.entities
            && (Arc::ptr_eq(&self.grid, &other.grid) || self.grid == other.grid)
    }
}

impl Eq for Snapshot {}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SnapshotRef {
            grid: &self.grid,
            entities: self.entities.values().collect(),
            tick: self.tick,
            next_serial: self.next_serial,
        }
        .serialize(serializer)
    }
}

impl TryFrom<SnapshotRepr> for Snapshot {
    type Error = WorldError;

    fn try_from(repr: SnapshotRepr) -> Result<Self, Self::Error> {
        Snapshot::from_parts(repr.grid, repr.entities, repr.tick, repr.next_serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::entity::PropertyValue;

    fn walled(width: u32, height: u32) -> Grid {
        let mut grid = Grid::new(width, height).unwrap();
        for p in grid.positions().collect::<Vec<_>>() {
            if p.x == 0 || p.y == 0 || p.x == width as i32 - 1 || p.y == height as i32 - 1 {
                grid.set(p, crate::world::grid::WALL);
            }
        }
        grid
    }

    #[test]
    fn test_entities_iterate_in_id_order() {
        let snap = Snapshot::from_parts(
            walled(5, 5),
            vec![
                Entity::new("zeta", "box", Position::new(1, 1)),
                Entity::new("alpha", "box", Position::new(2, 2)),
            ],
            0,
            0,
        )
        .unwrap();
        let ids: Vec<_> = snap.entities().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_two_blocking_entities_rejected() {
        let err = Snapshot::from_parts(
            walled(5, 5),
            vec![
                Entity::new("a", "box", Position::new(1, 1)),
                Entity::new("b", "box", Position::new(1, 1)),
            ],
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, WorldError::CellOccupied { .. }));
    }

    #[test]
    fn test_reported_violation_is_stable() {
        let stacked = || {
            vec![
                Entity::new("d", "box", Position::new(3, 3)),
                Entity::new("a", "box", Position::new(2, 2)),
                Entity::new("e", "box", Position::new(1, 1)),
                Entity::new("c", "box", Position::new(3, 3)),
                Entity::new("b", "box", Position::new(1, 1)),
                Entity::new("f", "box", Position::new(2, 2)),
            ]
        };
        for _ in 0..32 {
            let err = Snapshot::from_parts(walled(5, 5), stacked(), 0, 0).unwrap_err();
            assert_eq!(
                err,
                WorldError::CellOccupied {
                    position: Position::new(3, 3),
                    first: EntityId::from("c"),
                    second: EntityId::from("d"),
                }
            );
        }
    }

    #[test]
    fn test_non_blocking_entities_share_cells() {
        let snap = Snapshot::from_parts(
            walled(5, 5),
            vec![
                Entity::new("a", "player", Position::new(1, 1)),
                Entity::new("b", "food", Position::new(1, 1))
                    .with_property("blocking", PropertyValue::Bool(false)),
            ],
            0,
            0,
        )
        .unwrap();
        assert_eq!(snap.entities_at(Position::new(1, 1)).count(), 2);
        assert_eq!(
            snap.blocking_occupant(Position::new(1, 1)).map(|e| e.id.as_str()),
            Some("a")
        );
        assert!(!snap.is_empty_cell(Position::new(1, 1)));
    }

    #[test]
    fn test_out_of_range_and_wall_rejected() {
        let out = Snapshot::from_parts(
            walled(4, 4),
            vec![Entity::new("a", "box", Position::new(9, 1))],
            0,
            0,
        );
        assert!(matches!(out, Err(WorldError::OutOfBounds { .. })));

        let wall = Snapshot::from_parts(
            walled(4, 4),
            vec![Entity::new("a", "box", Position::new(0, 1))],
            0,
            0,
        );
        assert!(matches!(wall, Err(WorldError::OnWall { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Snapshot::from_parts(
            walled(5, 5),
            vec![
                Entity::new("a", "box", Position::new(1, 1)),
                Entity::new("a", "box", Position::new(2, 2)),
            ],
            0,
            0,
        )
        .unwrap_err();
        assert_eq!(err, WorldError::DuplicateId(EntityId::from("a")));
    }

    #[test]
    fn test_walkability() {
        let snap = Snapshot::from_parts(
            walled(5, 5),
            vec![Entity::new("a", "box", Position::new(2, 2))],
            0,
            0,
        )
        .unwrap();
        assert!(snap.is_walkable(Position::new(1, 1), None));
        assert!(!snap.is_walkable(Position::new(0, 1), None));
        assert!(!snap.is_walkable(Position::new(2, 2), None));
        assert!(snap.is_walkable(Position::new(2, 2), Some(&EntityId::from("a"))));
        assert!(!snap.is_walkable(Position::new(-1, 2), None));
    }

    #[test]
    fn test_empty_cells_row_major() {
        let snap = Snapshot::from_parts(
            walled(4, 4),
            vec![Entity::new("a", "box", Position::new(1, 1))],
            0,
            0,
        )
        .unwrap();
        assert_eq!(
            snap.empty_cells(),
            vec![Position::new(2, 1), Position::new(1, 2), Position::new(2, 2)]
        );
    }

    #[test]
    fn test_json_shape() {
        let snap = Snapshot::from_parts(
            walled(3, 3),
            vec![Entity::new("a", "box", Position::new(1, 1))],
            7,
            2,
        )
        .unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["tick"], 7);
        assert_eq!(json["entities"][0]["type"], "box");
        assert_eq!(json["entities"][0]["position"][0], 1);

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
