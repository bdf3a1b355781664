//! Simulation: per-tick scheduling, conflict resolution, commits and history

pub mod conflict;
pub mod engine;
pub mod report;
pub mod scheduler;
pub mod state;

pub use conflict::{Proposal, Resolution};
pub use engine::{load, Simulation};
pub use report::{AppliedMutation, StepReport, SuppressedEffect, SuppressionReason, TickOutcome};
pub use scheduler::PLAYER_INPUT_RULE;
pub use state::{apply_diff, diff, BatchError, DiffError, InvalidMutationError, SnapshotDiff, StateManager};
