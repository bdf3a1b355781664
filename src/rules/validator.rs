//! Rule validation: compile a rule set once, before any tick runs
//!
//! Checks run in a fixed order so the first error for a given document is
//! always the same one:
//! 1. unique names
//! 2. integer priorities
//! 3. conditions and actions compile, and action kinds fit rule kinds
//! 4. every referenced type and property exists in the catalog
//! 5. no cycle among constraint rules in the dependency graph

use crate::condition::{compile_condition, CompileError, Condition};
use crate::rules::action::{Action, ActionDefError, TargetSelector};
use crate::rules::definition::{PredicateDef, RuleDef, RuleKind};
use crate::rules::graph::{action_reads, action_writes, expression_reads, literal_type, RuleGraph};
use crate::world::catalog::EntityCatalog;
use ahash::AHashSet;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// Keyword in `when.entities` selecting every entity
pub const ANY_ENTITY: &str = "any";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    EntityType,
    Property,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReferenceKind::EntityType => "entity type",
            ReferenceKind::Property => "property",
        })
    }
}

/// Load-time rule errors, each naming the offending rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rule '{rule}': {error}")]
    Syntax { rule: String, error: CompileError },

    #[error("rule '{rule}': {error}")]
    Semantic { rule: String, error: CompileError },

    #[error("rule '{rule}' references unknown {kind} '{name}'")]
    UnknownReference {
        rule: String,
        kind: ReferenceKind,
        name: String,
    },

    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("rule '{rule}' has priority {value}, expected an integer")]
    InvalidPriority { rule: String, value: String },

    #[error("rule '{rule}': {message}")]
    InvalidAction { rule: String, message: String },

    #[error("cyclic constraint: {}", cycle.join(" -> "))]
    CyclicConstraint { cycle: Vec<String> },
}

impl ValidationError {
    fn compile(rule: &str, error: CompileError) -> Self {
        match error {
            CompileError::Syntax { .. } => ValidationError::Syntax {
                rule: rule.to_string(),
                error,
            },
            CompileError::Semantic { .. } => ValidationError::Semantic {
                rule: rule.to_string(),
                error,
            },
        }
    }

    fn action(rule: &str, error: ActionDefError) -> Self {
        match error {
            ActionDefError::Invalid(message) => ValidationError::InvalidAction {
                rule: rule.to_string(),
                message,
            },
            ActionDefError::Compile { error, .. } => Self::compile(rule, error),
        }
    }
}

/// Which entities a rule is evaluated for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    /// One candidate per tick with no subject
    Global,
    /// Every entity
    All,
    Types(BTreeSet<String>),
}

impl Applicability {
    pub fn from_entities(entities: &[String]) -> Self {
        if entities.is_empty() {
            Applicability::Global
        } else if entities.iter().any(|t| t == ANY_ENTITY) {
            Applicability::All
        } else {
            Applicability::Types(entities.iter().cloned().collect())
        }
    }

    pub fn applies_to(&self, entity_type: &str) -> bool {
        match self {
            Applicability::Global => false,
            Applicability::All => true,
            Applicability::Types(types) => types.contains(entity_type),
        }
    }

    fn subject_types(&self) -> Option<&BTreeSet<String>> {
        match self {
            Applicability::Types(types) => Some(types),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub name: String,
    pub kind: RuleKind,
    pub priority: i64,
    /// Declaration index, the first tie-break after priority
    pub order: usize,
    pub applicability: Applicability,
    pub condition: Condition,
    pub action: Action,
}

/// A compiled victory or failure predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Description if given, else the condition text
    pub label: String,
    pub condition: Condition,
    pub scope: Applicability,
}

impl Predicate {
    /// Compile a standalone predicate without catalog checks
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        Ok(Self {
            label: source.to_string(),
            condition: compile_condition(source)?,
            scope: Applicability::Global,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    /// Rules in declaration order
    pub rules: Vec<CompiledRule>,
    pub graph: RuleGraph,
    /// Catalog widened with spawned types and transformed properties
    pub catalog: EntityCatalog,
    pub victory: Vec<Predicate>,
    pub failure: Vec<Predicate>,
}

/// Validate and compile a rule set against an entity catalog
pub fn validate_rules(
    defs: &[RuleDef],
    catalog: &EntityCatalog,
) -> Result<CompiledRuleSet, ValidationError> {
    let mut seen = AHashSet::new();
    for def in defs {
        if !seen.insert(def.name.as_str()) {
            return Err(ValidationError::DuplicateRule(def.name.clone()));
        }
    }

    let priorities = defs
        .iter()
        .map(|def| parse_priority(&def.name, def.priority.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rules = Vec::with_capacity(defs.len());
    for (order, (def, priority)) in defs.iter().zip(priorities).enumerate() {
        let condition = compile_condition(&def.when.condition)
            .map_err(|e| ValidationError::compile(&def.name, e))?;
        let action = Action::parse(&def.then.action, &def.then.parameters)
            .map_err(|e| ValidationError::action(&def.name, e))?;
        check_action_kind(&def.name, def.kind, &action)?;
        rules.push(CompiledRule {
            name: def.name.clone(),
            kind: def.kind,
            priority,
            order,
            applicability: Applicability::from_entities(&def.when.entities),
            condition,
            action,
        });
    }

    let mut catalog = catalog.clone();
    for rule in &rules {
        extend_catalog(&mut catalog, &rule.action, &rule.applicability);
    }
    for rule in &rules {
        check_references(&rule.name, &catalog, &rule.condition, &rule.applicability)?;
        for expr in rule.action.expressions() {
            check_references(&rule.name, &catalog, expr, &Applicability::All)?;
        }
        check_targets(&rule.name, &catalog, &rule.action)?;
    }

    let nodes: Vec<_> = rules
        .iter()
        .map(|rule| {
            let mut reads = expression_reads(&rule.condition.references());
            reads.extend(action_reads(&rule.action));
            let writes = action_writes(
                &rule.action,
                rule.applicability.subject_types(),
                &catalog,
            );
            (rule.name.clone(), reads, writes)
        })
        .collect();
    let graph = RuleGraph::build(&nodes);
    if let Some(cycle) = graph.find_cycle(|i| rules[i].kind == RuleKind::Constraint) {
        return Err(ValidationError::CyclicConstraint {
            cycle: graph.names_of(&cycle),
        });
    }

    debug!(rules = rules.len(), types = catalog.types().count(), "Rule set validated");
    Ok(CompiledRuleSet {
        rules,
        graph,
        catalog,
        victory: Vec::new(),
        failure: Vec::new(),
    })
}

impl CompiledRuleSet {
    /// Compile victory and failure predicates against the widened catalog
    pub fn with_predicates(
        mut self,
        victory: &[PredicateDef],
        failure: &[PredicateDef],
    ) -> Result<Self, ValidationError> {
        self.victory = compile_predicates("victory_conditions", victory, &self.catalog)?;
        self.failure = compile_predicates("failure_conditions", failure, &self.catalog)?;
        Ok(self)
    }

    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

fn compile_predicates(
    group: &str,
    defs: &[PredicateDef],
    catalog: &EntityCatalog,
) -> Result<Vec<Predicate>, ValidationError> {
    defs.iter()
        .enumerate()
        .map(|(i, def)| {
            let name = format!("{}[{}]", group, i);
            let condition =
                compile_condition(&def.condition).map_err(|e| ValidationError::compile(&name, e))?;
            let scope = Applicability::from_entities(&def.entities);
            check_references(&name, catalog, &condition, &scope)?;
            Ok(Predicate {
                label: if def.description.is_empty() {
                    def.condition.clone()
                } else {
                    def.description.clone()
                },
                condition,
                scope,
            })
        })
        .collect()
}

fn parse_priority(rule: &str, value: Option<&JsonValue>) -> Result<i64, ValidationError> {
    match value {
        None => Ok(0),
        Some(v) => v.as_i64().ok_or_else(|| ValidationError::InvalidPriority {
            rule: rule.to_string(),
            value: v.to_string(),
        }),
    }
}

fn check_action_kind(rule: &str, kind: RuleKind, action: &Action) -> Result<(), ValidationError> {
    let is_validate = matches!(action, Action::Validate { .. });
    let message = match (kind, is_validate) {
        (RuleKind::Constraint, false) => "constraint rules must use the validate action",
        (RuleKind::Conditional | RuleKind::Transformation, true) => {
            "validate is only allowed in constraint rules"
        }
        _ => return Ok(()),
    };
    Err(ValidationError::InvalidAction {
        rule: rule.to_string(),
        message: message.to_string(),
    })
}

fn extend_catalog(catalog: &mut EntityCatalog, action: &Action, applicability: &Applicability) {
    match action {
        Action::Spawn {
            entity_type,
            properties,
            ..
        } => {
            catalog.declare_type(entity_type);
            for name in properties.keys() {
                catalog.declare_property(entity_type, name);
            }
        }
        Action::Transform {
            target,
            effect,
            retype,
        } => {
            let targets: Vec<String> = match (target, applicability) {
                (TargetSelector::Adjacent(t), _) => vec![t.clone()],
                (TargetSelector::SelfEntity, Applicability::Types(types)) => {
                    types.iter().cloned().collect()
                }
                (TargetSelector::SelfEntity, _) => catalog.types().map(str::to_string).collect(),
            };
            for t in &targets {
                for name in effect.keys() {
                    catalog.declare_property(t, name);
                }
            }
            if let Some(new_type) = literal_type(retype) {
                catalog.declare_type(&new_type);
                for name in effect.keys() {
                    catalog.declare_property(&new_type, name);
                }
            }
        }
        Action::Validate { failure, .. } => extend_catalog(catalog, failure, applicability),
        Action::Move { .. } | Action::Destroy { .. } => {}
    }
}

fn unknown(rule: &str, kind: ReferenceKind, name: &str) -> ValidationError {
    ValidationError::UnknownReference {
        rule: rule.to_string(),
        kind,
        name: name.to_string(),
    }
}

fn check_references(
    rule: &str,
    catalog: &EntityCatalog,
    condition: &Condition,
    scope: &Applicability,
) -> Result<(), ValidationError> {
    if let Applicability::Types(types) = scope {
        if let Some(t) = types.iter().find(|t| !catalog.has_type(t)) {
            return Err(unknown(rule, ReferenceKind::EntityType, t));
        }
    }
    let refs = condition.references();
    if let Some(t) = refs.types.iter().find(|t| !catalog.has_type(t)) {
        return Err(unknown(rule, ReferenceKind::EntityType, t));
    }
    if let Some(p) = refs.properties.iter().find(|p| !catalog.has_property(p)) {
        return Err(unknown(rule, ReferenceKind::Property, p));
    }
    Ok(())
}

fn check_targets(rule: &str, catalog: &EntityCatalog, action: &Action) -> Result<(), ValidationError> {
    match action {
        Action::Move {
            target: TargetSelector::Adjacent(t),
            ..
        }
        | Action::Transform {
            target: TargetSelector::Adjacent(t),
            ..
        }
        | Action::Destroy {
            target: TargetSelector::Adjacent(t),
        } if !catalog.has_type(t) => Err(unknown(rule, ReferenceKind::EntityType, t)),
        Action::Validate { failure, .. } => check_targets(rule, catalog, failure),
        _ => Ok(()),
    }
}
