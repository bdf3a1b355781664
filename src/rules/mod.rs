//! Rules: document definitions, the action language, validation and the
//! rule dependency graph

pub mod action;
pub mod definition;
pub mod graph;
pub mod validator;

pub use action::{Action, ActionError, Placement, TargetSelector};
pub use definition::{PredicateDef, RuleDef, RuleKind};
pub use graph::{Fact, RuleGraph};
pub use validator::{
    validate_rules, Applicability, CompiledRule, CompiledRuleSet, Predicate, ValidationError,
};
