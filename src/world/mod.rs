//! World model: grid, entities, snapshots and the documents they load from

pub mod catalog;
pub mod entity;
pub mod grid;
pub mod loader;
pub mod mutation;
pub mod snapshot;

pub use catalog::EntityCatalog;
pub use entity::{Entity, PropertyValue};
pub use grid::{CellCode, Grid, GridError};
pub use loader::{Document, LoadedWorld};
pub use mutation::{Mutation, MutationKind, MutationPayload};
pub use snapshot::{Snapshot, WorldError};
