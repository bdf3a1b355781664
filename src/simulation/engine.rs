//! Simulation handle - ties the world, the compiled rules and the history
//! together
//!
//! Each tick runs: enumerate -> filter -> propose -> resolve conflicts ->
//! commit -> check victory/failure. The handle is the only thing a host
//! (CLI, server, embedding application) talks to.

use crate::core::config::EngineConfig;
use crate::core::error::{HistoryEmptyError, LoadError, QueryError, StepError};
use crate::core::types::{Direction, EntityId};
use crate::rules::{validate_rules, CompiledRuleSet, Predicate};
use crate::simulation::conflict;
use crate::simulation::report::{AppliedMutation, StepReport, SuppressedEffect, SuppressionReason};
use crate::simulation::scheduler::{self, PlayerMove};
use crate::simulation::state::{self, SnapshotDiff, StateManager};
use crate::world::loader::{Document, Metadata};
use crate::world::Snapshot;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// A loaded, running simulation
#[derive(Debug, Clone)]
pub struct Simulation {
    metadata: Metadata,
    rules: CompiledRuleSet,
    state: StateManager,
    player: Option<EntityId>,
    config: EngineConfig,
}

/// Load a JSON document with the default configuration
pub fn load(json: &str) -> Result<Simulation, LoadError> {
    Simulation::load(json)
}

impl Simulation {
    pub fn load(json: &str) -> Result<Self, LoadError> {
        Self::load_with_config(json, EngineConfig::default())
    }

    pub fn load_with_config(json: &str, config: EngineConfig) -> Result<Self, LoadError> {
        Self::from_document(&Document::from_json(json)?, config)
    }

    pub fn load_file(path: &Path, config: EngineConfig) -> Result<Self, LoadError> {
        Self::from_document(&Document::from_file(path)?, config)
    }

    /// Build the world, validate the rules and seed the random stream
    ///
    /// A `seed` in the document takes precedence over `config.seed`.
    pub fn from_document(document: &Document, mut config: EngineConfig) -> Result<Self, LoadError> {
        config.validate()?;
        if let Some(seed) = document.seed {
            config.seed = seed;
        }

        let world = document.build_world()?;
        let rules = validate_rules(&document.rules, &world.catalog)?
            .with_predicates(&document.victory_conditions, &document.failure_conditions)?;

        info!(
            name = %document.metadata.name,
            entities = world.snapshot.len(),
            rules = rules.rules.len(),
            seed = config.seed,
            "Simulation loaded"
        );

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            metadata: document.metadata.clone(),
            state: StateManager::new(world.snapshot, rng, config.max_history),
            rules,
            player: world.player,
            config,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &CompiledRuleSet {
        &self.rules
    }

    /// The entity player input moves, if any
    pub fn player(&self) -> Option<&EntityId> {
        self.player.as_ref()
    }

    /// Read-only view of the current snapshot
    pub fn state(&self) -> &Snapshot {
        self.state.current()
    }

    pub fn history_len(&self) -> usize {
        self.state.history_len()
    }

    /// Advance one tick with no player input
    pub fn step(&mut self) -> Result<StepReport, StepError> {
        self.run_tick(None)
    }

    /// Advance one tick after moving the player by an input token
    /// (`up`, `down`, `left`, `right`, `wait`)
    pub fn submit_input(&mut self, token: &str) -> Result<StepReport, StepError> {
        let direction: Direction = token.parse().map_err(StepError::UnknownInput)?;
        self.submit_direction(direction)
    }

    pub fn submit_direction(&mut self, direction: Direction) -> Result<StepReport, StepError> {
        self.run_tick(Some(direction))
    }

    pub fn undo(&mut self) -> Result<&Snapshot, HistoryEmptyError> {
        self.state.undo()
    }

    pub fn redo(&mut self) -> Result<&Snapshot, HistoryEmptyError> {
        self.state.redo()
    }

    /// Evaluate condition text against the current snapshot
    pub fn query(&self, condition: &str) -> Result<bool, QueryError> {
        let predicate = Predicate::compile(condition)?;
        Ok(self.state.query(&predicate)?)
    }

    /// Entity-level difference between the current snapshot and another
    pub fn diff_from(&self, earlier: &Snapshot) -> SnapshotDiff {
        state::diff(earlier, self.state.current())
    }

    fn resolve_input(&self, direction: Direction) -> Result<Option<PlayerMove>, StepError> {
        let (dx, dy) = direction.delta();
        if (dx, dy) == (0, 0) {
            return Ok(None);
        }
        let id = self.player.as_ref().ok_or(StepError::NoPlayer)?;
        let player = self
            .state
            .current()
            .entity(id)
            .ok_or_else(|| StepError::PlayerGone(id.clone()))?;
        Ok(Some(PlayerMove {
            player: id.clone(),
            from: player.position,
            to: player.position.offset(dx, dy),
        }))
    }

    fn run_tick(&mut self, direction: Option<Direction>) -> Result<StepReport, StepError> {
        let player_move = match direction {
            Some(d) => self.resolve_input(d)?,
            None => None,
        };
        let input = direction.map_or((0, 0), |d| {
            let (dx, dy) = d.delta();
            (i64::from(dx), i64::from(dy))
        });

        let plan = scheduler::plan_tick(
            self.state.current(),
            &self.rules,
            input,
            player_move,
            self.state.rng().clone(),
            self.config.parallel_threshold,
        );
        let resolution = conflict::resolve(plan.proposals);

        let mut suppressed = plan.unresolved;
        suppressed.extend(resolution.losers.into_iter().map(|loser| SuppressedEffect {
            rule: loser.proposal.rule,
            entity: loser.proposal.subject,
            mutation: Some(loser.proposal.mutation),
            reason: SuppressionReason::Conflict {
                winner: loser.winner,
            },
        }));

        let batch: Vec<_> = resolution.winners.iter().map(|p| p.mutation.clone()).collect();
        let commit = self.state.commit(&batch, plan.rng);

        let mut applied = Vec::new();
        for (proposal, verdict) in resolution.winners.into_iter().zip(commit.verdicts) {
            match verdict {
                Ok(()) => applied.push(AppliedMutation {
                    rule: proposal.rule,
                    mutation: proposal.mutation,
                }),
                Err(e) => suppressed.push(SuppressedEffect {
                    rule: proposal.rule,
                    entity: proposal.subject,
                    mutation: Some(proposal.mutation),
                    reason: SuppressionReason::InvalidMutation(e),
                }),
            }
        }

        for effect in &suppressed {
            trace!(rule = %effect.rule, entity = ?effect.entity, reason = %effect.reason, "Effect suppressed");
        }

        let world = self.state.current();
        let victory = !self.rules.victory.is_empty()
            && self.rules.victory.iter().all(|p| self.holds(world, p));
        let failure = self.rules.failure.iter().any(|p| self.holds(world, p));

        debug!(
            tick = world.tick(),
            candidates = plan.candidates,
            satisfied = plan.satisfied,
            applied = applied.len(),
            suppressed = suppressed.len(),
            victory,
            failure,
            "Tick complete"
        );

        Ok(StepReport {
            tick: world.tick(),
            outcome: commit.outcome,
            new_snapshot: world.clone(),
            applied_mutations: applied,
            suppressed_effects: suppressed,
            victory,
            failure,
        })
    }

    fn holds(&self, world: &Snapshot, predicate: &Predicate) -> bool {
        match state::predicate_holds(world, predicate) {
            Ok(holds) => holds,
            Err(e) => {
                warn!(predicate = %predicate.label, error = %e, "Predicate evaluation failed");
                false
            }
        }
    }
}
