//! State manager: the current snapshot, the bounded history and commits
//!
//! Every batch is screened against the pre-batch snapshot only. A cell is
//! free for an arrival when each blocking occupant leaves in the same batch;
//! screening repeats until no verdict changes. Only blocking arrivals that
//! land in the same cell are settled by batch order.

use crate::condition::{EvalContext, EvalError};
use crate::core::error::HistoryEmptyError;
use crate::core::types::{EntityId, Position, Tick};
use crate::rules::{Applicability, Predicate};
use crate::simulation::conflict;
use crate::simulation::report::TickOutcome;
use crate::world::entity::{Entity, PropertyValue, BLOCKING_PROPERTY};
use crate::world::mutation::{Mutation, MutationKind, MutationPayload};
use crate::world::{Snapshot, WorldError};
use ahash::AHashSet;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single mutation could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMutationError {
    #[error("'{id}' cannot enter {position}: outside the grid")]
    OutOfBounds { id: EntityId, position: Position },

    #[error("'{id}' cannot enter {position}: wall")]
    Wall { id: EntityId, position: Position },

    #[error("'{id}' cannot enter {position}: occupied by '{occupant}'")]
    Occupied {
        id: EntityId,
        position: Position,
        occupant: EntityId,
    },

    #[error("entity '{0}' does not exist")]
    UnknownEntity(EntityId),

    #[error("entity id '{0}' already exists")]
    DuplicateId(EntityId),

    #[error("mutation on '{0}' conflicts with an earlier mutation in the batch")]
    Contested(EntityId),

    #[error("batch rejected: {0}")]
    Invariant(#[from] WorldError),
}

/// A diff that does not fit the snapshot it is applied to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("diff expects entity '{0}', which the snapshot lacks")]
    Missing(EntityId),

    #[error("diff adds entity '{0}', which the snapshot already has")]
    AlreadyPresent(EntityId),

    #[error("diff expects '{0}' to differ from what the snapshot holds")]
    Stale(EntityId),

    #[error(transparent)]
    Invariant(#[from] WorldError),
}

/// Rejection of a strict `apply`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("mutation {index} ({} on '{}') rejected: {error}", .mutation.kind(), .mutation.entity_id)]
    Mutation {
        index: usize,
        mutation: Mutation,
        error: InvalidMutationError,
    },

    #[error("batch breaks a world invariant: {0}")]
    Invariant(#[from] WorldError),
}

/// Result of a scheduler commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub outcome: TickOutcome,
    /// Verdict per batch index; every entry is `Err` when the tick was rejected
    pub verdicts: Vec<Result<(), InvalidMutationError>>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    snapshot: Snapshot,
    rng: ChaCha8Rng,
}

/// Owner of the current world and its undo/redo stacks
#[derive(Debug, Clone)]
pub struct StateManager {
    current: Snapshot,
    rng: ChaCha8Rng,
    history: VecDeque<HistoryEntry>,
    future: Vec<HistoryEntry>,
    max_history: usize,
}

impl StateManager {
    pub fn new(initial: Snapshot, rng: ChaCha8Rng, max_history: usize) -> Self {
        Self {
            current: initial,
            rng,
            history: VecDeque::new(),
            future: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Random stream as of the current snapshot
    pub fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Screen, build and swap in the next snapshot
    ///
    /// Mutations the pre-batch world refuses are dropped individually. If
    /// the remaining batch breaks a global invariant the whole tick is
    /// rejected and the snapshot stays as it was. Either way the call is one
    /// history entry and the random stream moves on to `rng_after`.
    pub fn commit(&mut self, batch: &[Mutation], rng_after: ChaCha8Rng) -> Commit {
        let mut verdicts = screen(&self.current, batch);
        let accepted: Vec<&Mutation> = batch
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| v.is_ok())
            .map(|(m, _)| m)
            .collect();

        match build(&self.current, &accepted) {
            Ok(next) => {
                debug!(tick = next.tick(), applied = accepted.len(), "Batch committed");
                self.record(next, rng_after);
                Commit {
                    outcome: TickOutcome::Committed,
                    verdicts,
                }
            }
            Err(e) => {
                warn!(tick = self.current.tick(), error = %e, "Batch rejected");
                for verdict in verdicts.iter_mut().filter(|v| v.is_ok()) {
                    *verdict = Err(InvalidMutationError::Invariant(e.clone()));
                }
                let unchanged = self.current.clone();
                self.record(unchanged, rng_after);
                Commit {
                    outcome: TickOutcome::Rejected {
                        reason: e.to_string(),
                    },
                    verdicts,
                }
            }
        }
    }

    /// Apply a batch all-or-nothing
    ///
    /// The first mutation that conflicts with an earlier one or that the
    /// pre-batch world refuses fails the whole batch.
    pub fn apply(&mut self, batch: &[Mutation]) -> Result<&Snapshot, BatchError> {
        for (index, mutation) in batch.iter().enumerate() {
            if batch[..index].iter().any(|m| conflict::conflicts(m, mutation)) {
                return Err(BatchError::Mutation {
                    index,
                    mutation: mutation.clone(),
                    error: InvalidMutationError::Contested(mutation.entity_id.clone()),
                });
            }
        }
        let verdicts = screen(&self.current, batch);
        if let Some((index, Err(error))) = verdicts.into_iter().enumerate().find(|(_, v)| v.is_err()) {
            return Err(BatchError::Mutation {
                index,
                mutation: batch[index].clone(),
                error,
            });
        }
        let all: Vec<&Mutation> = batch.iter().collect();
        let next = build(&self.current, &all)?;
        let rng = self.rng.clone();
        self.record(next, rng);
        Ok(&self.current)
    }

    /// Restore the snapshot before the most recent commit
    pub fn undo(&mut self) -> Result<&Snapshot, HistoryEmptyError> {
        let entry = self.history.pop_back().ok_or(HistoryEmptyError)?;
        let current = std::mem::replace(&mut self.current, entry.snapshot);
        let rng = std::mem::replace(&mut self.rng, entry.rng);
        self.future.push(HistoryEntry {
            snapshot: current,
            rng,
        });
        Ok(&self.current)
    }

    /// Re-apply the most recently undone commit
    pub fn redo(&mut self) -> Result<&Snapshot, HistoryEmptyError> {
        let entry = self.future.pop().ok_or(HistoryEmptyError)?;
        let current = std::mem::replace(&mut self.current, entry.snapshot);
        let rng = std::mem::replace(&mut self.rng, entry.rng);
        self.push_history(HistoryEntry {
            snapshot: current,
            rng,
        });
        Ok(&self.current)
    }

    /// Evaluate a predicate against the current snapshot
    pub fn query(&self, predicate: &Predicate) -> Result<bool, EvalError> {
        predicate_holds(&self.current, predicate)
    }

    fn record(&mut self, next: Snapshot, rng: ChaCha8Rng) {
        let snapshot = std::mem::replace(&mut self.current, next);
        let rng = std::mem::replace(&mut self.rng, rng);
        self.push_history(HistoryEntry { snapshot, rng });
        self.future.clear();
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}

/// Whether a predicate holds: globally, or for any entity in its scope
pub fn predicate_holds(world: &Snapshot, predicate: &Predicate) -> Result<bool, EvalError> {
    match &predicate.scope {
        Applicability::Global => Ok(predicate
            .condition
            .evaluate(&EvalContext::new(world, None, (0, 0)))?
            .satisfied),
        scope => {
            for entity in world.entities().filter(|e| scope.applies_to(&e.entity_type)) {
                let ctx = EvalContext::new(world, Some(entity), (0, 0));
                if predicate.condition.evaluate(&ctx)?.satisfied {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Where an accepted mutation leaves its entity at the end of the batch
#[derive(Debug, Clone, Copy)]
struct Arrival {
    cell: Position,
    /// The entity blocks `cell` afterwards
    blocks: bool,
    /// The cell must be free of other blocking entities
    needs_room: bool,
}

fn arrival(
    world: &Snapshot,
    batch: &[Mutation],
    verdicts: &[Result<(), InvalidMutationError>],
    mutation: &Mutation,
) -> Option<Arrival> {
    match &mutation.payload {
        MutationPayload::Move { to, .. } => Some(Arrival {
            cell: *to,
            blocks: world.entity(&mutation.entity_id).map_or(true, Entity::is_blocking),
            needs_room: true,
        }),
        MutationPayload::Spawn { entity, .. } => Some(Arrival {
            cell: entity.position,
            blocks: entity.is_blocking(),
            needs_room: entity.is_blocking(),
        }),
        MutationPayload::SetProperty { properties, .. } => {
            let turns_blocking = properties
                .get(BLOCKING_PROPERTY)
                .map_or(false, |v| *v != PropertyValue::Bool(false));
            if !turns_blocking {
                return None;
            }
            let cell = batch
                .iter()
                .zip(verdicts)
                .find_map(|(m, v)| match &m.payload {
                    MutationPayload::Move { to, .. } if v.is_ok() && m.entity_id == mutation.entity_id => {
                        Some(*to)
                    }
                    _ => None,
                })
                .or_else(|| world.entity(&mutation.entity_id).map(|e| e.position))?;
            Some(Arrival {
                cell,
                blocks: true,
                needs_room: true,
            })
        }
        MutationPayload::Destroy => None,
    }
}

/// Per-mutation verdicts against the pre-batch world
///
/// A move, a blocking spawn, or a property set that makes an entity
/// blocking needs its end-of-batch cell free of blocking entities that stay
/// put. When two accepted mutations leave blocking entities in one cell the
/// later one in the batch is refused.
pub fn screen(world: &Snapshot, batch: &[Mutation]) -> Vec<Result<(), InvalidMutationError>> {
    let mut verdicts: Vec<_> = batch.iter().map(|m| check_static(world, m)).collect();
    loop {
        let leaving: AHashSet<&EntityId> = batch
            .iter()
            .zip(&verdicts)
            .filter(|(m, v)| {
                v.is_ok() && matches!(m.payload, MutationPayload::Move { .. } | MutationPayload::Destroy)
            })
            .map(|(m, _)| &m.entity_id)
            .collect();
        let arrivals: Vec<Option<Arrival>> = batch
            .iter()
            .zip(&verdicts)
            .map(|(m, v)| v.as_ref().ok().and_then(|_| arrival(world, batch, &verdicts, m)))
            .collect();

        let mut changed = false;
        for (index, mutation) in batch.iter().enumerate() {
            if verdicts[index].is_err() {
                continue;
            }
            let Some(here) = arrivals[index].filter(|a| a.needs_room) else {
                continue;
            };
            let resident = world
                .entities_at(here.cell)
                .find(|e| e.is_blocking() && e.id != mutation.entity_id && !leaving.contains(&e.id))
                .map(|e| &e.id);
            let earlier = || {
                batch[..index]
                    .iter()
                    .zip(&arrivals[..index])
                    .find(|(m, a)| {
                        m.entity_id != mutation.entity_id
                            && a.map_or(false, |a| a.blocks && a.cell == here.cell)
                    })
                    .map(|(m, _)| &m.entity_id)
            };
            if let Some(occupant) = resident.or_else(earlier) {
                verdicts[index] = Err(InvalidMutationError::Occupied {
                    id: mutation.entity_id.clone(),
                    position: here.cell,
                    occupant: occupant.clone(),
                });
                changed = true;
            }
        }
        if !changed {
            return verdicts;
        }
    }
}

fn check_static(world: &Snapshot, mutation: &Mutation) -> Result<(), InvalidMutationError> {
    let id = &mutation.entity_id;
    match (&mutation.payload, world.entity(id)) {
        (MutationPayload::Spawn { .. }, Some(_)) => {
            return Err(InvalidMutationError::DuplicateId(id.clone()))
        }
        (MutationPayload::Spawn { .. }, None) => {}
        (_, None) => return Err(InvalidMutationError::UnknownEntity(id.clone())),
        (_, Some(_)) => {}
    }
    if let Some(position) = mutation.destination() {
        if !world.grid().contains(position) {
            return Err(InvalidMutationError::OutOfBounds {
                id: id.clone(),
                position,
            });
        }
        if world.grid().is_wall(position) {
            return Err(InvalidMutationError::Wall {
                id: id.clone(),
                position,
            });
        }
    }
    Ok(())
}

fn apply_rank(mutation: &Mutation) -> u8 {
    match mutation.kind() {
        MutationKind::Destroy => 0,
        MutationKind::Move => 1,
        MutationKind::SetProperty => 2,
        MutationKind::Spawn => 3,
    }
}

/// Next snapshot from accepted mutations: destroys, moves, property sets,
/// then spawns
fn build(world: &Snapshot, accepted: &[&Mutation]) -> Result<Snapshot, WorldError> {
    let mut ordered = accepted.to_vec();
    ordered.sort_by_key(|m| apply_rank(m));

    let mut entities = world.entity_table().clone();
    let mut next_serial = world.next_serial();
    for mutation in ordered {
        match &mutation.payload {
            MutationPayload::Destroy => {
                entities.remove(&mutation.entity_id);
            }
            MutationPayload::Move { to, .. } => {
                if let Some(entity) = entities.get_mut(&mutation.entity_id) {
                    entity.position = *to;
                }
            }
            MutationPayload::SetProperty { properties, retype } => {
                if let Some(entity) = entities.get_mut(&mutation.entity_id) {
                    entity
                        .properties
                        .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                    if let Some(new_type) = retype {
                        entity.entity_type = new_type.clone();
                    }
                }
            }
            MutationPayload::Spawn { entity, serial } => {
                next_serial = next_serial.max(serial.saturating_add(1));
                let mut entity = entity.clone();
                entity.id = mutation.entity_id.clone();
                entities.insert(entity.id.clone(), entity);
            }
        }
    }
    world.successor(entities, next_serial)
}

/// One entity present in both snapshots with different contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChange {
    pub before: Entity,
    pub after: Entity,
}

/// What changed between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub from_tick: Tick,
    pub to_tick: Tick,
    /// Spawn serial of the newer snapshot
    pub next_serial: u64,
    pub added: Vec<Entity>,
    pub removed: Vec<Entity>,
    pub modified: Vec<EntityChange>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// The same change seen from the newer snapshot
    ///
    /// `next_serial` cannot be recovered and is carried over unchanged.
    pub fn reversed(&self) -> SnapshotDiff {
        SnapshotDiff {
            from_tick: self.to_tick,
            to_tick: self.from_tick,
            next_serial: self.next_serial,
            added: self.removed.clone(),
            removed: self.added.clone(),
            modified: self
                .modified
                .iter()
                .map(|c| EntityChange {
                    before: c.after.clone(),
                    after: c.before.clone(),
                })
                .collect(),
        }
    }
}

/// Entity-level difference between two snapshots, each list in id order
pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff {
        from_tick: old.tick(),
        to_tick: new.tick(),
        next_serial: new.next_serial(),
        ..SnapshotDiff::default()
    };
    for before in old.entities() {
        match new.entity(&before.id) {
            None => result.removed.push(before.clone()),
            Some(after) if after != before => result.modified.push(EntityChange {
                before: before.clone(),
                after: after.clone(),
            }),
            Some(_) => {}
        }
    }
    result.added = new
        .entities()
        .filter(|e| old.entity(&e.id).is_none())
        .cloned()
        .collect();
    result
}

/// Rebuild the newer snapshot of a diff from the older one
///
/// Every removed or modified entity must match `base` exactly, so a diff
/// only applies to the snapshot it was taken from.
pub fn apply_diff(base: &Snapshot, diff: &SnapshotDiff) -> Result<Snapshot, DiffError> {
    let mut entities = base.entity_table().clone();
    let expected = diff.removed.iter().chain(diff.modified.iter().map(|c| &c.before));
    for entity in expected {
        match entities.get(&entity.id) {
            None => return Err(DiffError::Missing(entity.id.clone())),
            Some(found) if found != entity => return Err(DiffError::Stale(entity.id.clone())),
            Some(_) => {}
        }
    }
    for entity in &diff.removed {
        entities.remove(&entity.id);
    }
    for change in &diff.modified {
        entities.insert(change.after.id.clone(), change.after.clone());
    }
    for entity in &diff.added {
        if entities.insert(entity.id.clone(), entity.clone()).is_some() {
            return Err(DiffError::AlreadyPresent(entity.id.clone()));
        }
    }
    Ok(base.rebuilt(entities, diff.to_tick, diff.next_serial)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::entity::PropertyValue;
    use crate::world::grid::{Grid, WALL};
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn world() -> Snapshot {
        let mut grid = Grid::new(5, 3).unwrap();
        grid.set(Position::new(4, 1), WALL);
        Snapshot::from_parts(
            grid,
            vec![
                Entity::new("a", "worm", Position::new(1, 1)),
                Entity::new("b", "worm", Position::new(2, 1)),
                Entity::new("c", "worm", Position::new(3, 1)),
                Entity::new("food", "food", Position::new(0, 0))
                    .with_property("blocking", PropertyValue::Bool(false)),
            ],
            0,
            0,
        )
        .unwrap()
    }

    fn manager() -> StateManager {
        StateManager::new(world(), ChaCha8Rng::seed_from_u64(1), 3)
    }

    fn mv(id: &str, from: (i32, i32), to: (i32, i32)) -> Mutation {
        Mutation::movement(id.into(), Position::new(from.0, from.1), Position::new(to.0, to.1))
    }

    #[test]
    fn test_chain_moves_into_vacated_cells() {
        let world = world();
        let batch = vec![mv("a", (1, 1), (2, 1)), mv("b", (2, 1), (3, 1)), mv("c", (3, 1), (3, 2))];
        assert!(screen(&world, &batch).iter().all(Result::is_ok));
    }

    #[test]
    fn test_blocked_head_cascades_down_the_chain() {
        let world = world();
        // c runs into the wall, so b and then a have nowhere to go
        let batch = vec![mv("a", (1, 1), (2, 1)), mv("b", (2, 1), (3, 1)), mv("c", (3, 1), (4, 1))];
        let verdicts = screen(&world, &batch);
        match &verdicts[2] {
            Err(InvalidMutationError::Wall { id, .. }) => assert_eq!(id.as_str(), "c"),
            other => panic!("Expected Wall, got {:?}", other),
        }
        assert!(matches!(verdicts[1], Err(InvalidMutationError::Occupied { .. })));
        assert!(matches!(verdicts[0], Err(InvalidMutationError::Occupied { .. })));
    }

    #[test]
    fn test_swap_is_accepted() {
        let world = world();
        let batch = vec![mv("a", (1, 1), (2, 1)), mv("b", (2, 1), (1, 1))];
        assert!(screen(&world, &batch).iter().all(Result::is_ok));
    }

    #[test]
    fn test_commit_drops_only_invalid_mutations() {
        let mut state = manager();
        let batch = vec![mv("c", (3, 1), (4, 1)), mv("food", (0, 0), (1, 0))];
        let commit = state.commit(&batch, ChaCha8Rng::seed_from_u64(2));
        assert!(commit.outcome.is_committed());
        assert!(commit.verdicts[0].is_err());
        assert!(commit.verdicts[1].is_ok());
        assert_eq!(state.current().tick(), 1);
        assert_eq!(
            state.current().entity(&"food".into()).map(|e| e.position),
            Some(Position::new(1, 0))
        );
    }

    fn set_blocking(id: &str) -> Mutation {
        let mut properties = BTreeMap::new();
        properties.insert("blocking".to_string(), PropertyValue::Bool(true));
        Mutation {
            entity_id: id.into(),
            payload: MutationPayload::SetProperty {
                properties,
                retype: None,
            },
        }
    }

    #[test]
    fn test_non_blocking_mover_cannot_enter_blocked_cell() {
        let world = world();
        assert!(screen(&world, &[mv("food", (0, 0), (1, 0))]).iter().all(Result::is_ok));

        let into_worm = vec![mv("food", (0, 0), (1, 1))];
        match &screen(&world, &into_worm)[0] {
            Err(InvalidMutationError::Occupied { occupant, .. }) => assert_eq!(occupant.as_str(), "a"),
            other => panic!("Expected Occupied, got {:?}", other),
        }
        // the worm leaving first makes room
        let chase = vec![mv("a", (1, 1), (1, 0)), mv("food", (0, 0), (1, 1))];
        assert!(screen(&world, &chase).iter().all(Result::is_ok));
    }

    #[test]
    fn test_turning_blocking_in_shared_cell_is_dropped_alone() {
        let mut entities: Vec<Entity> = world().entities().cloned().collect();
        entities.push(
            Entity::new("dust", "dust", Position::new(3, 1))
                .with_property("blocking", PropertyValue::Bool(false)),
        );
        let mut grid = Grid::new(5, 3).unwrap();
        grid.set(Position::new(4, 1), WALL);
        let shared = Snapshot::from_parts(grid, entities, 0, 0).unwrap();
        let mut state = StateManager::new(shared, ChaCha8Rng::seed_from_u64(1), 3);

        let batch = vec![mv("a", (1, 1), (1, 0)), set_blocking("dust")];
        let commit = state.commit(&batch, ChaCha8Rng::seed_from_u64(2));
        assert!(commit.outcome.is_committed());
        assert!(commit.verdicts[0].is_ok());
        match &commit.verdicts[1] {
            Err(InvalidMutationError::Occupied { occupant, position, .. }) => {
                assert_eq!(occupant.as_str(), "c");
                assert_eq!(*position, Position::new(3, 1));
            }
            other => panic!("Expected Occupied, got {:?}", other),
        }
        assert_eq!(
            state.current().entity(&"a".into()).map(|e| e.position),
            Some(Position::new(1, 0))
        );
    }

    #[test]
    fn test_blocking_arrivals_settle_by_batch_order() {
        let world = world();
        // food steps to (1, 0) and becomes blocking there
        let batch = vec![mv("food", (0, 0), (1, 0)), set_blocking("food")];
        assert!(screen(&world, &batch).iter().all(Result::is_ok));

        // a blocking spawn already claimed the cell food ends up in
        let spawn = Mutation {
            entity_id: "rock#1".into(),
            payload: MutationPayload::Spawn {
                entity: Entity::new("rock#1", "rock", Position::new(1, 0)),
                serial: 1,
            },
        };
        let batch = vec![spawn, mv("food", (0, 0), (1, 0))];
        let verdicts = screen(&world, &batch);
        assert!(verdicts[0].is_ok());
        match &verdicts[1] {
            Err(InvalidMutationError::Occupied { occupant, .. }) => assert_eq!(occupant.as_str(), "rock#1"),
            other => panic!("Expected Occupied, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut state = manager();
        let batch = vec![mv("a", (1, 1), (1, 0)), mv("c", (3, 1), (4, 1))];
        match state.apply(&batch) {
            Err(BatchError::Mutation { index, error, .. }) => {
                assert_eq!(index, 1);
                assert!(matches!(error, InvalidMutationError::Wall { .. }));
            }
            other => panic!("Expected Mutation error, got {:?}", other),
        }
        assert_eq!(state.current().tick(), 0);
        assert_eq!(state.history_len(), 0);

        let contested = vec![mv("a", (1, 1), (1, 0)), mv("b", (2, 1), (1, 0))];
        assert!(matches!(
            state.apply(&contested),
            Err(BatchError::Mutation {
                index: 1,
                error: InvalidMutationError::Contested(_),
                ..
            })
        ));
    }

    #[test]
    fn test_spawn_and_destroy() {
        let mut state = manager();
        let coin = Entity::new("coin#7", "coin", Position::new(0, 2));
        let batch = vec![
            Mutation {
                entity_id: "coin#7".into(),
                payload: MutationPayload::Spawn {
                    entity: coin,
                    serial: 7,
                },
            },
            Mutation::destroy("a".into()),
        ];
        let next = state.apply(&batch).unwrap();
        assert_eq!(next.next_serial(), 8);
        assert!(next.entity(&"coin#7".into()).is_some());
        assert!(next.entity(&"a".into()).is_none());

        let dup = vec![Mutation {
            entity_id: "b".into(),
            payload: MutationPayload::Spawn {
                entity: Entity::new("b", "worm", Position::new(0, 1)),
                serial: 8,
            },
        }];
        assert!(matches!(
            state.apply(&dup),
            Err(BatchError::Mutation {
                error: InvalidMutationError::DuplicateId(_),
                ..
            })
        ));
    }

    #[test]
    fn test_undo_redo_and_bounded_history() {
        let mut state = manager();
        assert_eq!(state.undo().unwrap_err(), HistoryEmptyError);

        let start = state.current().clone();
        state.apply(&[mv("a", (1, 1), (1, 0))]).unwrap();
        let moved = state.current().clone();
        assert_eq!(state.undo().unwrap(), &start);
        assert!(state.can_redo());
        assert_eq!(state.redo().unwrap(), &moved);
        assert!(state.redo().is_err());

        for _ in 0..5 {
            state.commit(&[], state.rng().clone());
        }
        assert_eq!(state.history_len(), 3);
        assert_eq!(state.current().tick(), 6);
    }

    #[test]
    fn test_new_commit_clears_redo() {
        let mut state = manager();
        state.commit(&[], ChaCha8Rng::seed_from_u64(9));
        state.undo().unwrap();
        state.commit(&[], ChaCha8Rng::seed_from_u64(9));
        assert!(!state.can_redo());
    }

    #[test]
    fn test_diff_lists_changes() {
        let mut state = manager();
        let before = state.current().clone();
        state
            .apply(&[mv("a", (1, 1), (1, 0)), Mutation::destroy("c".into())])
            .unwrap();
        let d = diff(&before, state.current());
        assert_eq!(d.from_tick, 0);
        assert_eq!(d.to_tick, 1);
        assert!(d.added.is_empty());
        assert_eq!(d.removed.len(), 1);
        assert_eq!(d.modified[0].after.position, Position::new(1, 0));
        assert!(diff(&before, &before).is_empty());
    }

    #[test]
    fn test_apply_diff_replays_and_reverses() {
        let mut state = manager();
        let before = state.current().clone();
        let coin = Entity::new("coin#4", "coin", Position::new(0, 2));
        state
            .apply(&[
                mv("a", (1, 1), (1, 0)),
                Mutation::destroy("c".into()),
                Mutation {
                    entity_id: "coin#4".into(),
                    payload: MutationPayload::Spawn {
                        entity: coin,
                        serial: 4,
                    },
                },
            ])
            .unwrap();
        let after = state.current().clone();
        let d = diff(&before, &after);

        assert_eq!(apply_diff(&before, &d).unwrap(), after);
        let back = apply_diff(&after, &d.reversed()).unwrap();
        assert_eq!(back.entities().collect::<Vec<_>>(), before.entities().collect::<Vec<_>>());
        assert_eq!(back.tick(), 0);

        // a diff only fits the snapshot it came from
        assert_eq!(
            apply_diff(&after, &d).unwrap_err(),
            DiffError::Missing("c".into())
        );
        let mut wrong = before.entity_table().clone();
        if let Some(a) = wrong.get_mut(&EntityId::from("a")) {
            a.position = Position::new(0, 1);
        }
        let drifted = before.rebuilt(wrong, 0, 0).unwrap();
        assert_eq!(apply_diff(&drifted, &d).unwrap_err(), DiffError::Stale("a".into()));
    }

    #[test]
    fn test_query_scoped_predicate() {
        let state = manager();
        let predicate = Predicate {
            scope: Applicability::from_entities(&["worm".to_string()]),
            ..Predicate::compile("entity.x == 3").unwrap()
        };
        assert!(state.query(&predicate).unwrap());
        let global = Predicate::compile("count_entities('worm') == 2").unwrap();
        assert!(!state.query(&global).unwrap());
    }
}
