//! FlatLand - deterministic rule engine for declarative 2D grid worlds
//!
//! A JSON document describes a grid, the entities on it, rules written in a
//! small condition/action language, and victory/failure predicates. The
//! engine compiles and validates the rules once, then advances the world one
//! tick at a time with identical results for identical input.

pub mod condition;
pub mod core;
pub mod rules;
pub mod simulation;
pub mod world;

pub use crate::core::config::EngineConfig;
pub use crate::core::error::{HistoryEmptyError, LoadError, QueryError, StepError};
pub use simulation::{load, Simulation, StepReport, TickOutcome};
pub use world::Snapshot;
