//! Evaluation of compiled expressions against a snapshot
//!
//! Evaluation never mutates the world. Besides the result value it records
//! the first cell a `can_move_to` call accepted, which a `move` action
//! without an explicit position consumes.

use crate::condition::ast::{Attribute, BinaryOp, Builtin, Expr, UnaryOp, Variable};
use crate::condition::value::Value;
use crate::core::types::Position;
use crate::world::entity::Entity;
use crate::world::snapshot::Snapshot;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("type mismatch: cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{0}'")]
    Overflow(&'static str),
}

/// What an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub world: &'a Snapshot,
    /// Candidate entity; `None` for global rules and predicates
    pub subject: Option<&'a Entity>,
    /// Player input direction for this tick, `(0, 0)` when none
    pub input: (i64, i64),
}

impl<'a> EvalContext<'a> {
    pub fn new(world: &'a Snapshot, subject: Option<&'a Entity>, input: (i64, i64)) -> Self {
        Self {
            world,
            subject,
            input,
        }
    }

    /// Subject's heading: its own `dx`/`dy` properties, else the input direction
    pub fn heading(&self) -> (i64, i64) {
        match self.subject {
            Some(entity) => (
                entity.int_property("dx").unwrap_or(self.input.0),
                entity.int_property("dy").unwrap_or(self.input.1),
            ),
            None => self.input,
        }
    }

    /// Cell one step along the heading from the subject
    pub fn target(&self) -> Option<(i64, i64)> {
        let (dx, dy) = self.heading();
        self.subject.and_then(|e| {
            Some((
                i64::from(e.position.x).checked_add(dx)?,
                i64::from(e.position.y).checked_add(dy)?,
            ))
        })
    }
}

/// Values bound while evaluating a condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bindings {
    pub dx: i64,
    pub dy: i64,
    /// `(target_x, target_y)` when there is a subject
    pub target: Option<(i64, i64)>,
    /// First cell accepted by `can_move_to`
    pub move_target: Option<Position>,
}

/// Outcome of evaluating a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub satisfied: bool,
    pub bindings: Bindings,
}

pub(crate) struct Evaluator<'a> {
    ctx: EvalContext<'a>,
    bindings: Bindings,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(ctx: EvalContext<'a>) -> Self {
        let (dx, dy) = ctx.heading();
        Self {
            bindings: Bindings {
                dx,
                dy,
                target: ctx.target(),
                move_target: None,
            },
            ctx,
        }
    }

    pub(crate) fn into_bindings(self) -> Bindings {
        self.bindings
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Attribute(attr) => Ok(self.attribute(attr)),
            Expr::Variable(var) => Ok(self.variable(*var)),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expr::Unary(UnaryOp::Neg, inner) => match self.eval(inner)? {
                Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow("-")),
                Value::Null => Ok(Value::Null),
                other => Err(EvalError::TypeMismatch {
                    op: "-",
                    lhs: other.type_name(),
                    rhs: "int",
                }),
            },
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if !self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Builtin(builtin) => self.builtin(builtin),
        }
    }

    fn attribute(&self, attr: &Attribute) -> Value {
        let Some(entity) = self.ctx.subject else {
            return Value::Null;
        };
        match attr {
            Attribute::Id => Value::Str(entity.id.to_string()),
            Attribute::Type => Value::Str(entity.entity_type.clone()),
            Attribute::X => Value::Int(entity.position.x.into()),
            Attribute::Y => Value::Int(entity.position.y.into()),
            Attribute::Property(name) => entity.property(name).map(Value::from).unwrap_or(Value::Null),
        }
    }

    fn variable(&self, var: Variable) -> Value {
        match var {
            Variable::Dx => Value::Int(self.bindings.dx),
            Variable::Dy => Value::Int(self.bindings.dy),
            Variable::TargetX => self.bindings.target.map_or(Value::Null, |(x, _)| Value::Int(x)),
            Variable::TargetY => self.bindings.target.map_or(Value::Null, |(_, y)| Value::Int(y)),
            Variable::InputDx => Value::Int(self.ctx.input.0),
            Variable::InputDy => Value::Int(self.ctx.input.1),
            Variable::Tick => Value::Int(i64::try_from(self.ctx.world.tick()).unwrap_or(i64::MAX)),
        }
    }

    /// Integer argument; `None` for a missing value
    fn int_arg(&mut self, expr: &Expr, op: &'static str) -> Result<Option<i64>, EvalError> {
        match self.eval(expr)? {
            Value::Int(n) => Ok(Some(n)),
            Value::Null => Ok(None),
            other => Err(EvalError::TypeMismatch {
                op,
                lhs: other.type_name(),
                rhs: "int",
            }),
        }
    }

    fn cell_arg(&mut self, x: &Expr, y: &Expr, op: &'static str) -> Result<Option<Position>, EvalError> {
        let x = self.int_arg(x, op)?;
        let y = self.int_arg(y, op)?;
        Ok(match (x, y) {
            (Some(x), Some(y)) => Position::from_i64(x, y),
            _ => None,
        })
    }

    /// Entities of `entity_type` other than the subject
    fn others<'b>(&'b self, entity_type: &'b str) -> impl Iterator<Item = &'b Entity> + 'b {
        let subject = self.ctx.subject.map(|e| &e.id);
        self.ctx
            .world
            .entities_of_type(entity_type)
            .filter(move |e| Some(&e.id) != subject)
    }

    fn builtin(&mut self, builtin: &Builtin) -> Result<Value, EvalError> {
        let world = self.ctx.world;
        let subject = self.ctx.subject;
        let value = match builtin {
            Builtin::AdjacentTo(t) => Value::Bool(subject.is_some_and(|s| {
                s.position
                    .neighbors()
                    .iter()
                    .any(|p| world.entities_at(*p).any(|e| e.entity_type == *t && e.id != s.id))
            })),
            Builtin::DistanceTo(t, max) => {
                let max = self.int_arg(max, "distance_to")?;
                Value::Bool(match (subject, max) {
                    (Some(s), Some(max)) => self.others(t).any(|e| s.position.manhattan(&e.position) <= max),
                    _ => false,
                })
            }
            Builtin::CountNearby(t, radius) => {
                let radius = self.int_arg(radius, "count_nearby")?;
                Value::Int(match (subject, radius) {
                    (Some(s), Some(r)) => self
                        .others(t)
                        .filter(|e| s.position.manhattan(&e.position) <= r)
                        .count() as i64,
                    _ => 0,
                })
            }
            Builtin::HasProperty(name) => {
                Value::Bool(subject.and_then(|s| s.property(name)).is_some_and(|v| v.is_truthy()))
            }
            Builtin::IsType(t) => Value::Bool(subject.is_some_and(|s| s.entity_type == *t)),
            Builtin::CanMoveTo(x, y) => {
                let cell = self.cell_arg(x, y, "can_move_to")?;
                let ok = cell.is_some_and(|p| world.is_walkable(p, subject.map(|s| &s.id)));
                if ok && self.bindings.move_target.is_none() {
                    self.bindings.move_target = cell;
                }
                Value::Bool(ok)
            }
            Builtin::CountEntitiesOnGoals(t) => Value::Int(
                world
                    .entities_of_type(t)
                    .filter(|e| world.grid().is_goal(e.position))
                    .count() as i64,
            ),
            Builtin::CountEntities(t) => Value::Int(world.entities_of_type(t).count() as i64),
            Builtin::EntityAt(t, x, y) => {
                let cell = self.cell_arg(x, y, "entity_at")?;
                Value::Bool(cell.is_some_and(|p| world.has_type_at(t, p)))
            }
            Builtin::CellAt(x, y) => {
                let cell = self.cell_arg(x, y, "cell_at")?;
                Value::Int(cell.and_then(|p| world.grid().get(p)).map_or(-1, i64::from))
            }
            Builtin::CanSee(t, max) => {
                let max = self.int_arg(max, "can_see")?;
                Value::Bool(match (subject, max) {
                    (Some(s), Some(max)) => can_see(world, s, t, max),
                    _ => false,
                })
            }
            Builtin::HasSupportBelow => Value::Bool(subject.is_some_and(|s| {
                let below = s.position.offset(0, 1);
                !world.grid().contains(below)
                    || world.grid().is_wall(below)
                    || world.blocking_occupant(below).is_some()
            })),
        };
        Ok(value)
    }
}

/// Orthogonal line of sight from the subject, stopped by walls
fn can_see(world: &Snapshot, subject: &Entity, entity_type: &str, max: i64) -> bool {
    for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
        let mut pos = subject.position;
        for _ in 0..max.max(0) {
            pos = pos.offset(dx, dy);
            if !world.grid().contains(pos) || world.grid().is_wall(pos) {
                break;
            }
            if world.entities_at(pos).any(|e| e.entity_type == entity_type) {
                return true;
            }
        }
    }
    false
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        _ => {}
    }
    let (a, b) = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => (*a, *b),
        (Value::Null, Value::Int(_) | Value::Null) | (Value::Int(_), Value::Null) => {
            return Ok(match op {
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Value::Bool(false),
                _ => Value::Null,
            })
        }
        _ => {
            return Err(EvalError::TypeMismatch {
                op: symbol,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            })
        }
    };
    let overflow = || EvalError::Overflow(symbol);
    Ok(match op {
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinaryOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinaryOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => Value::Int(a.checked_div_euclid(b).ok_or_else(overflow)?),
        BinaryOp::Rem => Value::Int(a.checked_rem_euclid(b).ok_or_else(overflow)?),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne => Value::Bool(false),
    })
}
