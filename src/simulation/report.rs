//! Per-tick reports returned by `step` and `submit_input`

use crate::core::types::{EntityId, Tick};
use crate::rules::ActionError;
use crate::simulation::state::InvalidMutationError;
use crate::world::{Mutation, Snapshot};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Whether the tick's batch reached the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TickOutcome {
    Committed,
    /// The batch broke a world invariant and was discarded whole
    Rejected { reason: String },
}

impl TickOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TickOutcome::Committed)
    }
}

/// A mutation that reached the new snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMutation {
    pub rule: String,
    #[serde(flatten)]
    pub mutation: Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressionReason {
    /// An earlier candidate's mutation conflicted with this one
    Conflict { winner: String },
    InvalidMutation(InvalidMutationError),
    /// The action could not build a mutation
    Unresolved(ActionError),
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressionReason::Conflict { winner } => write!(f, "lost to rule '{}'", winner),
            SuppressionReason::InvalidMutation(e) => write!(f, "invalid mutation: {}", e),
            SuppressionReason::Unresolved(e) => write!(f, "action failed: {}", e),
        }
    }
}

impl Serialize for SuppressionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SuppressionReason", 2)?;
        match self {
            SuppressionReason::Conflict { winner } => {
                state.serialize_field("kind", "conflict")?;
                state.serialize_field("winner", winner)?;
            }
            SuppressionReason::InvalidMutation(e) => {
                state.serialize_field("kind", "invalid_mutation")?;
                state.serialize_field("message", &e.to_string())?;
            }
            SuppressionReason::Unresolved(e) => {
                state.serialize_field("kind", "unresolved")?;
                state.serialize_field("message", &e.to_string())?;
            }
        }
        state.end()
    }
}

/// A satisfied candidate whose effect did not reach the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressedEffect {
    pub rule: String,
    /// Candidate entity, `None` for global rules
    pub entity: Option<EntityId>,
    /// `None` when the action never produced a mutation
    pub mutation: Option<Mutation>,
    pub reason: SuppressionReason,
}

/// Everything one tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub tick: Tick,
    pub outcome: TickOutcome,
    pub new_snapshot: Snapshot,
    /// In application order
    pub applied_mutations: Vec<AppliedMutation>,
    pub suppressed_effects: Vec<SuppressedEffect>,
    pub victory: bool,
    pub failure: bool,
}

impl StepReport {
    /// Whether the run should stop here
    pub fn is_terminal(&self) -> bool {
        self.victory || self.failure
    }

    /// Suppressed effects of one rule
    pub fn suppressed_by<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a SuppressedEffect> {
        self.suppressed_effects.iter().filter(move |s| s.rule == rule)
    }
}
