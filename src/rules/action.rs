//! Action language: what a satisfied rule proposes
//!
//! Actions are parsed once from a rule's `then` block. At tick time an
//! action turns a satisfied candidate into at most one `Mutation`; it never
//! touches the world itself.

use crate::condition::{
    compile_condition, compile_expression, Bindings, CompileError, Condition, EvalContext,
    EvalError, Expr, Ty, Value,
};
use crate::core::types::{EntityId, Position};
use crate::world::entity::{Entity, PropertyValue};
use crate::world::loader::SPAWN_ID_SEPARATOR;
use crate::world::mutation::{Mutation, MutationPayload};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use thiserror::Error;

/// Problems in an action definition, found at load time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionDefError {
    #[error("{0}")]
    Invalid(String),

    #[error("in expression '{source_text}': {error}")]
    Compile {
        source_text: String,
        error: CompileError,
    },
}

/// Reasons a satisfied candidate produced no mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("action needs a subject entity")]
    NoSubject,

    #[error("no adjacent '{0}' to act on")]
    NoTarget(String),

    #[error("move has no destination")]
    NoDestination,

    #[error("no empty cell to spawn into")]
    NoEmptyCell,

    #[error("coordinate out of range")]
    OutOfRange,

    #[error("property '{property}' cannot be set to {found}")]
    InvalidValue { property: String, found: String },
}

/// Which entity an action applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    SelfEntity,
    /// Neighbour of this type, preferring the cell along the heading
    Adjacent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    RandomEmpty,
    At(Condition, Condition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move {
        target: TargetSelector,
        position: Option<(Condition, Condition)>,
    },
    Transform {
        target: TargetSelector,
        effect: BTreeMap<String, Condition>,
        retype: Option<Condition>,
    },
    Spawn {
        entity_type: String,
        placement: Placement,
        properties: BTreeMap<String, PropertyValue>,
    },
    Destroy {
        target: TargetSelector,
    },
    Validate {
        condition: Condition,
        failure: Box<Action>,
    },
}

/// Mutable per-tick state an action may draw from
pub struct ProposalState<'r> {
    pub rng: &'r mut ChaCha8Rng,
    /// Next spawn serial
    pub next_serial: &'r mut u64,
}

impl Action {
    /// Parse an action name and its parameters
    pub fn parse(name: &str, params: &Map<String, JsonValue>) -> Result<Self, ActionDefError> {
        match name {
            "move" => Ok(Action::Move {
                target: parse_target(params)?,
                position: match params.get("position") {
                    Some(value) => Some(parse_pair(value, "position")?),
                    None => None,
                },
            }),
            "transform" => parse_transform(params),
            "spawn" => parse_spawn(params),
            "destroy" => Ok(Action::Destroy {
                target: parse_target(params)?,
            }),
            "validate" => {
                let source = params
                    .get("condition")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| invalid("validate needs a 'condition' string"))?;
                let condition = compile_condition(source).map_err(|error| ActionDefError::Compile {
                    source_text: source.to_string(),
                    error,
                })?;
                let failure = params
                    .get("failure")
                    .and_then(JsonValue::as_object)
                    .ok_or_else(|| invalid("validate needs a 'failure' action object"))?;
                let failure_name = failure
                    .get("action")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| invalid("failure needs an 'action' name"))?;
                if failure_name == "validate" {
                    return Err(invalid("failure action cannot itself be validate"));
                }
                let empty = Map::new();
                let failure_params = failure
                    .get("parameters")
                    .and_then(JsonValue::as_object)
                    .unwrap_or(&empty);
                Ok(Action::Validate {
                    condition,
                    failure: Box::new(Action::parse(failure_name, failure_params)?),
                })
            }
            other => Err(invalid(&format!("unknown action '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Transform { .. } => "transform",
            Action::Spawn { .. } => "spawn",
            Action::Destroy { .. } => "destroy",
            Action::Validate { .. } => "validate",
        }
    }

    /// Every compiled expression inside this action
    pub fn expressions(&self) -> Vec<&Condition> {
        match self {
            Action::Move { position, .. } => position.iter().flat_map(|(x, y)| [x, y]).collect(),
            Action::Transform { effect, retype, .. } => {
                effect.values().chain(retype.iter()).collect()
            }
            Action::Spawn {
                placement: Placement::At(x, y),
                ..
            } => vec![x, y],
            Action::Spawn { .. } | Action::Destroy { .. } => Vec::new(),
            Action::Validate { condition, failure } => {
                let mut all = vec![condition];
                all.extend(failure.expressions());
                all
            }
        }
    }

    /// Propose the mutation for one satisfied candidate
    ///
    /// `Ok(None)` means the action holds nothing to do, e.g. a validate whose
    /// condition holds or a move onto the entity's own cell.
    pub fn propose(
        &self,
        ctx: &EvalContext<'_>,
        bindings: &Bindings,
        state: &mut ProposalState<'_>,
    ) -> Result<Option<Mutation>, ActionError> {
        match self {
            Action::Validate { condition, failure } => {
                if condition.evaluate(ctx)?.satisfied {
                    Ok(None)
                } else {
                    failure.propose(ctx, bindings, state)
                }
            }
            Action::Move { target, position } => {
                let subject = ctx.subject.ok_or(ActionError::NoSubject)?;
                let entity = resolve_target(ctx, target)?;
                let destination = match position {
                    Some((x, y)) => eval_position(ctx, x, y)?,
                    None if entity.id == subject.id => bindings
                        .move_target
                        .or_else(|| bindings.target.and_then(|(x, y)| Position::from_i64(x, y)))
                        .ok_or(ActionError::NoDestination)?,
                    None => {
                        // push: continue along the subject-to-target line
                        let dx = entity.position.x - subject.position.x;
                        let dy = entity.position.y - subject.position.y;
                        entity.position.offset(dx, dy)
                    }
                };
                if destination == entity.position {
                    return Ok(None);
                }
                Ok(Some(Mutation::movement(
                    entity.id.clone(),
                    entity.position,
                    destination,
                )))
            }
            Action::Transform {
                target,
                effect,
                retype,
            } => {
                let entity = resolve_target(ctx, target)?;
                let mut properties = BTreeMap::new();
                for (name, expr) in effect {
                    let value = expr.value(ctx)?;
                    let found = value.to_string();
                    let property = value.into_property().ok_or_else(|| ActionError::InvalidValue {
                        property: name.clone(),
                        found,
                    })?;
                    properties.insert(name.clone(), property);
                }
                let retype = match retype {
                    Some(expr) => match expr.value(ctx)? {
                        Value::Str(t) if !t.is_empty() => Some(t),
                        other => {
                            return Err(ActionError::InvalidValue {
                                property: "type".to_string(),
                                found: other.to_string(),
                            })
                        }
                    },
                    None => None,
                };
                Ok(Some(Mutation {
                    entity_id: entity.id.clone(),
                    payload: MutationPayload::SetProperty { properties, retype },
                }))
            }
            Action::Spawn {
                entity_type,
                placement,
                properties,
            } => {
                let position = match placement {
                    Placement::At(x, y) => eval_position(ctx, x, y)?,
                    Placement::RandomEmpty => {
                        let empties = ctx.world.empty_cells();
                        if empties.is_empty() {
                            return Err(ActionError::NoEmptyCell);
                        }
                        empties[state.rng.gen_range(0..empties.len())]
                    }
                };
                let serial = *state.next_serial;
                *state.next_serial += 1;
                let id = EntityId::new(format!("{}{}{}", entity_type, SPAWN_ID_SEPARATOR, serial));
                let mut entity = Entity::new(id.clone(), entity_type.clone(), position);
                entity.properties = properties.clone();
                Ok(Some(Mutation {
                    entity_id: id,
                    payload: MutationPayload::Spawn { entity, serial },
                }))
            }
            Action::Destroy { target } => {
                let entity = resolve_target(ctx, target)?;
                Ok(Some(Mutation::destroy(entity.id.clone())))
            }
        }
    }
}

fn invalid(message: &str) -> ActionDefError {
    ActionDefError::Invalid(message.to_string())
}

fn compile_value(value: &JsonValue, what: &str) -> Result<Condition, ActionDefError> {
    let source = match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) if n.is_i64() => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        other => return Err(invalid(&format!("{} must be an integer, boolean or expression, got {}", what, other))),
    };
    compile_expression(&source).map_err(|error| ActionDefError::Compile {
        source_text: source,
        error,
    })
}

/// Transform values: a bare word that is not a variable or built-in, such
/// as `open`, is stored as that string
fn compile_effect_value(value: &JsonValue, what: &str) -> Result<Condition, ActionDefError> {
    match (compile_value(value, what), value) {
        (Err(ActionDefError::Compile { .. }), JsonValue::String(word)) if is_bare_word(word) => Ok(Condition {
            source: word.clone(),
            expr: Expr::Literal(Value::Str(word.clone())),
        }),
        (result, _) => result,
    }
}

fn is_bare_word(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile_int(value: &JsonValue, what: &str) -> Result<Condition, ActionDefError> {
    let expr = compile_value(value, what)?;
    if !expr.expr.ty().fits(Ty::Int) {
        return Err(invalid(&format!("{} must be an integer expression", what)));
    }
    Ok(expr)
}

fn parse_pair(value: &JsonValue, what: &str) -> Result<(Condition, Condition), ActionDefError> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => Ok((compile_int(x, what)?, compile_int(y, what)?)),
        _ => Err(invalid(&format!("{} must be an [x, y] pair", what))),
    }
}

fn parse_target(params: &Map<String, JsonValue>) -> Result<TargetSelector, ActionDefError> {
    match params.get("target") {
        None => Ok(TargetSelector::SelfEntity),
        Some(JsonValue::String(s)) if s == "self" => Ok(TargetSelector::SelfEntity),
        Some(JsonValue::Object(obj)) => match obj.get("adjacent").and_then(JsonValue::as_str) {
            Some(t) => Ok(TargetSelector::Adjacent(t.to_string())),
            None => Err(invalid("target object must be {\"adjacent\": \"<type>\"}")),
        },
        Some(other) => Err(invalid(&format!("unknown target {}", other))),
    }
}

fn parse_transform(params: &Map<String, JsonValue>) -> Result<Action, ActionDefError> {
    let target = parse_target(params)?;
    let entries: Vec<(&String, &JsonValue)> = match params.get("effect") {
        Some(JsonValue::Object(effect)) => effect.iter().collect(),
        Some(_) => return Err(invalid("effect must be an object")),
        None => params.iter().filter(|(k, _)| k.as_str() != "target").collect(),
    };
    let mut effect = BTreeMap::new();
    let mut retype = None;
    for (name, value) in entries {
        let expr = compile_effect_value(value, name)?;
        if name == "type" {
            if !expr.expr.ty().fits(Ty::Str) {
                return Err(invalid("type must be a string expression"));
            }
            retype = Some(expr);
        } else {
            effect.insert(name.clone(), expr);
        }
    }
    if effect.is_empty() && retype.is_none() {
        return Err(invalid("transform has no effect"));
    }
    Ok(Action::Transform {
        target,
        effect,
        retype,
    })
}

fn parse_spawn(params: &Map<String, JsonValue>) -> Result<Action, ActionDefError> {
    let entity_type = params
        .get("type")
        .and_then(JsonValue::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("spawn needs a 'type' string"))?;
    if entity_type.contains(SPAWN_ID_SEPARATOR) {
        return Err(invalid("spawned type names cannot contain '#'"));
    }
    let placement = match params.get("position") {
        None => Placement::RandomEmpty,
        Some(JsonValue::String(s)) if s == "random_empty" => Placement::RandomEmpty,
        Some(value) => {
            let (x, y) = parse_pair(value, "position")?;
            Placement::At(x, y)
        }
    };
    let properties = match params.get("properties") {
        None => BTreeMap::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| invalid(&format!("invalid spawn properties: {}", e)))?,
    };
    Ok(Action::Spawn {
        entity_type: entity_type.to_string(),
        placement,
        properties,
    })
}

fn eval_position(ctx: &EvalContext<'_>, x: &Condition, y: &Condition) -> Result<Position, ActionError> {
    match (x.value(ctx)?, y.value(ctx)?) {
        (Value::Int(x), Value::Int(y)) => Position::from_i64(x, y).ok_or(ActionError::OutOfRange),
        _ => Err(ActionError::NoDestination),
    }
}

fn resolve_target<'a>(ctx: &EvalContext<'a>, target: &TargetSelector) -> Result<&'a Entity, ActionError> {
    let subject = ctx.subject.ok_or(ActionError::NoSubject)?;
    match target {
        TargetSelector::SelfEntity => Ok(subject),
        TargetSelector::Adjacent(entity_type) => {
            let (dx, dy) = ctx.heading();
            let ahead = Position::from_i64(
                i64::from(subject.position.x) + dx.signum(),
                i64::from(subject.position.y) + dy.signum(),
            );
            let is_match = |e: &&Entity| e.entity_type == *entity_type && e.id != subject.id;
            let neighbours = subject.position.neighbors();
            ahead
                .filter(|p| neighbours.contains(p))
                .into_iter()
                .chain(neighbours)
                .find_map(|p| ctx.world.entities_at(p).find(is_match))
                .ok_or_else(|| ActionError::NoTarget(entity_type.clone()))
        }
    }
}
