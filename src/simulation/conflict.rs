//! Conflict resolution among the mutations proposed in one tick
//!
//! Proposals arrive in candidate order (priority desc, declaration order,
//! entity id). Each proposal is kept unless it conflicts with one already
//! kept, so the earlier candidate always wins.

use crate::core::types::EntityId;
use crate::world::mutation::{Mutation, MutationPayload};

/// A mutation with the candidate that proposed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub rule: String,
    pub priority: i64,
    pub subject: Option<EntityId>,
    pub mutation: Mutation,
}

/// A proposal dropped in favour of an earlier one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loser {
    pub proposal: Proposal,
    pub winner: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub winners: Vec<Proposal>,
    pub losers: Vec<Loser>,
}

/// Whether two mutations cannot both be applied in one batch
pub fn conflicts(a: &Mutation, b: &Mutation) -> bool {
    if a.entity_id == b.entity_id && same_entity_conflict(&a.payload, &b.payload) {
        return true;
    }
    matches!((a.destination(), b.destination()), (Some(x), Some(y)) if x == y)
}

fn same_entity_conflict(a: &MutationPayload, b: &MutationPayload) -> bool {
    use MutationPayload::*;
    match (a, b) {
        (Destroy, _) | (_, Destroy) => true,
        (Move { .. }, Move { .. }) => true,
        (Spawn { .. }, _) | (_, Spawn { .. }) => true,
        (
            SetProperty {
                properties: pa,
                retype: ra,
            },
            SetProperty {
                properties: pb,
                retype: rb,
            },
        ) => (ra.is_some() && rb.is_some()) || pa.keys().any(|k| pb.contains_key(k)),
        (Move { .. }, SetProperty { .. }) | (SetProperty { .. }, Move { .. }) => false,
    }
}

/// Keep each proposal unless it conflicts with an earlier kept one
pub fn resolve(proposals: Vec<Proposal>) -> Resolution {
    let mut resolution = Resolution::default();
    for proposal in proposals {
        let winner = resolution
            .winners
            .iter()
            .find(|w| conflicts(&w.mutation, &proposal.mutation))
            .map(|w| w.rule.clone());
        match winner {
            Some(winner) => resolution.losers.push(Loser { proposal, winner }),
            None => resolution.winners.push(proposal),
        }
    }
    resolution
}
