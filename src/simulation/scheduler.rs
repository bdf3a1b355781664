//! Per-tick scheduling: enumerate candidates, order them, filter by
//! condition and collect proposals
//!
//! Filtering reads only the pre-tick snapshot, so it runs on the rayon pool
//! for large candidate sets. Proposals are built sequentially in candidate
//! order since `spawn` draws from the shared random stream.

use crate::condition::{Bindings, EvalContext};
use crate::core::types::{EntityId, Position};
use crate::rules::action::ProposalState;
use crate::rules::{Applicability, CompiledRule, CompiledRuleSet};
use crate::simulation::conflict::Proposal;
use crate::simulation::report::{SuppressedEffect, SuppressionReason};
use crate::world::entity::Entity;
use crate::world::{Mutation, Snapshot};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::cmp::Reverse;
use tracing::{trace, warn};

/// Rule name reported for the player's own move
pub const PLAYER_INPUT_RULE: &str = "player_input";

/// One (rule, entity) pair considered this tick
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub rule: &'a CompiledRule,
    /// `None` for global rules
    pub subject: Option<&'a Entity>,
}

impl Candidate<'_> {
    fn subject_id(&self) -> Option<EntityId> {
        self.subject.map(|e| e.id.clone())
    }
}

/// Player input resolved against the pre-tick world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerMove {
    pub player: EntityId,
    pub from: Position,
    pub to: Position,
}

/// Proposals for one tick, before conflict resolution
#[derive(Debug)]
pub struct TickPlan {
    /// In candidate order, the player's move first
    pub proposals: Vec<Proposal>,
    /// Satisfied candidates whose action failed
    pub unresolved: Vec<SuppressedEffect>,
    pub candidates: usize,
    pub satisfied: usize,
    /// Random stream after this tick's draws
    pub rng: ChaCha8Rng,
}

/// All candidates in evaluation order: priority descending, then rule
/// declaration order, then entity id
pub fn enumerate<'a>(world: &'a Snapshot, rules: &'a CompiledRuleSet) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::new();
    for rule in &rules.rules {
        match &rule.applicability {
            Applicability::Global => candidates.push(Candidate {
                rule,
                subject: None,
            }),
            scope => candidates.extend(
                world
                    .entities()
                    .filter(|e| scope.applies_to(&e.entity_type))
                    .map(|e| Candidate {
                        rule,
                        subject: Some(e),
                    }),
            ),
        }
    }
    candidates.sort_by_key(|c| (Reverse(c.rule.priority), c.rule.order, c.subject.map(|e| &e.id)));
    candidates
}

fn evaluate(candidate: &Candidate<'_>, world: &Snapshot, input: (i64, i64)) -> Option<Bindings> {
    let ctx = EvalContext::new(world, candidate.subject, input);
    match candidate.rule.condition.evaluate(&ctx) {
        Ok(evaluation) if evaluation.satisfied => Some(evaluation.bindings),
        Ok(_) => None,
        Err(e) => {
            warn!(
                rule = %candidate.rule.name,
                entity = ?candidate.subject_id(),
                error = %e,
                "Condition evaluation failed, candidate dropped"
            );
            None
        }
    }
}

/// Run filtering and proposal for one tick
pub fn plan_tick(
    world: &Snapshot,
    rules: &CompiledRuleSet,
    input: (i64, i64),
    player_move: Option<PlayerMove>,
    mut rng: ChaCha8Rng,
    parallel_threshold: usize,
) -> TickPlan {
    let candidates = enumerate(world, rules);

    // Results come back in candidate order either way
    let filtered: Vec<Option<Bindings>> = if candidates.len() >= parallel_threshold {
        candidates
            .par_iter()
            .map(|c| evaluate(c, world, input))
            .collect()
    } else {
        candidates.iter().map(|c| evaluate(c, world, input)).collect()
    };

    let mut proposals = Vec::new();
    if let Some(PlayerMove { player, from, to }) = player_move {
        proposals.push(Proposal {
            rule: PLAYER_INPUT_RULE.to_string(),
            priority: i64::MAX,
            subject: Some(player.clone()),
            mutation: Mutation::movement(player, from, to),
        });
    }

    let mut unresolved = Vec::new();
    let mut satisfied = 0;
    let mut next_serial = world.next_serial();
    for (candidate, bindings) in candidates.iter().zip(filtered) {
        let Some(bindings) = bindings else {
            continue;
        };
        satisfied += 1;
        let ctx = EvalContext::new(world, candidate.subject, input);
        let mut state = ProposalState {
            rng: &mut rng,
            next_serial: &mut next_serial,
        };
        match candidate.rule.action.propose(&ctx, &bindings, &mut state) {
            Ok(Some(mutation)) => proposals.push(Proposal {
                rule: candidate.rule.name.clone(),
                priority: candidate.rule.priority,
                subject: candidate.subject_id(),
                mutation,
            }),
            Ok(None) => {}
            Err(e) => {
                trace!(rule = %candidate.rule.name, error = %e, "Action produced no mutation");
                unresolved.push(SuppressedEffect {
                    rule: candidate.rule.name.clone(),
                    entity: candidate.subject_id(),
                    mutation: None,
                    reason: SuppressionReason::Unresolved(e),
                });
            }
        }
    }

    TickPlan {
        proposals,
        unresolved,
        candidates: candidates.len(),
        satisfied,
        rng,
    }
}
