//! Typed expression tree for compiled conditions

use crate::condition::value::Value;
use std::collections::BTreeSet;

/// Static type of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Bool,
    Int,
    Str,
    /// Property reads, whose type is only known at evaluation
    Any,
}

impl Ty {
    /// Whether a value of this type may stand where `expected` is required
    pub fn fits(self, expected: Ty) -> bool {
        self == expected || self == Ty::Any || expected == Ty::Any
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Ty::Bool => "bool",
            Ty::Int => "int",
            Ty::Str => "string",
            Ty::Any => "any",
        })
    }
}

/// `entity.<attribute>` reads on the subject entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Id,
    Type,
    X,
    Y,
    Property(String),
}

/// Named integers bound per candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Dx,
    Dy,
    TargetX,
    TargetY,
    InputDx,
    InputDy,
    Tick,
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dx" => Some(Variable::Dx),
            "dy" => Some(Variable::Dy),
            "target_x" => Some(Variable::TargetX),
            "target_y" => Some(Variable::TargetY),
            "input_dx" => Some(Variable::InputDx),
            "input_dy" => Some(Variable::InputDy),
            "tick" => Some(Variable::Tick),
            _ => None,
        }
    }

    /// Whether the value derives from the subject's heading
    pub fn reads_heading(self) -> bool {
        matches!(
            self,
            Variable::Dx | Variable::Dy | Variable::TargetX | Variable::TargetY
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Built-in predicates and queries
///
/// Type arguments are string literals fixed at compile time so the validator
/// can check them against the entity catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    AdjacentTo(String),
    DistanceTo(String, Box<Expr>),
    CountNearby(String, Box<Expr>),
    HasProperty(String),
    IsType(String),
    CanMoveTo(Box<Expr>, Box<Expr>),
    CountEntitiesOnGoals(String),
    CountEntities(String),
    EntityAt(String, Box<Expr>, Box<Expr>),
    /// Cell code, `-1` off-grid
    CellAt(Box<Expr>, Box<Expr>),
    CanSee(String, Box<Expr>),
    HasSupportBelow,
}

impl Builtin {
    pub fn result_type(&self) -> Ty {
        match self {
            Builtin::CountNearby(..)
            | Builtin::CountEntitiesOnGoals(_)
            | Builtin::CountEntities(_)
            | Builtin::CellAt(..) => Ty::Int,
            _ => Ty::Bool,
        }
    }

    /// Entity type this built-in queries, if any
    pub fn queried_type(&self) -> Option<&str> {
        match self {
            Builtin::AdjacentTo(t)
            | Builtin::DistanceTo(t, _)
            | Builtin::CountNearby(t, _)
            | Builtin::CountEntitiesOnGoals(t)
            | Builtin::CountEntities(t)
            | Builtin::EntityAt(t, ..)
            | Builtin::CanSee(t, _) => Some(t),
            _ => None,
        }
    }

    fn args(&self) -> Vec<&Expr> {
        match self {
            Builtin::DistanceTo(_, a) | Builtin::CountNearby(_, a) | Builtin::CanSee(_, a) => {
                vec![a.as_ref()]
            }
            Builtin::CanMoveTo(x, y) | Builtin::EntityAt(_, x, y) | Builtin::CellAt(x, y) => {
                vec![x.as_ref(), y.as_ref()]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Value),
    Attribute(Attribute),
    Variable(Variable),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Builtin(Builtin),
}

/// What an expression reads, gathered for validation and the rule graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// Entity types named by built-ins (`is_type` included)
    pub types: BTreeSet<String>,
    /// Types whose population or placement is queried
    pub populations: BTreeSet<String>,
    /// Property names read through `entity.properties.*` or `has_property`
    pub properties: BTreeSet<String>,
    pub reads_position: bool,
    pub reads_type_tag: bool,
    pub reads_heading: bool,
}

impl Expr {
    pub fn ty(&self) -> Ty {
        match self {
            Expr::Literal(Value::Bool(_)) => Ty::Bool,
            Expr::Literal(Value::Int(_)) => Ty::Int,
            Expr::Literal(Value::Str(_)) => Ty::Str,
            Expr::Literal(Value::Null) => Ty::Any,
            Expr::Attribute(Attribute::Id | Attribute::Type) => Ty::Str,
            Expr::Attribute(Attribute::X | Attribute::Y) => Ty::Int,
            Expr::Attribute(Attribute::Property(_)) => Ty::Any,
            Expr::Variable(_) => Ty::Int,
            Expr::Unary(UnaryOp::Not, _) => Ty::Bool,
            Expr::Unary(UnaryOp::Neg, _) => Ty::Int,
            Expr::Binary(op, ..) => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                    Ty::Int
                }
                _ => Ty::Bool,
            },
            Expr::Builtin(b) => b.result_type(),
        }
    }

    pub fn references(&self) -> References {
        let mut refs = References::default();
        self.collect(&mut refs);
        refs
    }

    fn collect(&self, refs: &mut References) {
        match self {
            Expr::Literal(_) => {}
            Expr::Attribute(attr) => match attr {
                Attribute::Id => {}
                Attribute::Type => refs.reads_type_tag = true,
                Attribute::X | Attribute::Y => refs.reads_position = true,
                Attribute::Property(name) => {
                    refs.properties.insert(name.clone());
                }
            },
            Expr::Variable(var) => {
                if var.reads_heading() {
                    refs.reads_heading = true;
                }
                if matches!(var, Variable::TargetX | Variable::TargetY) {
                    refs.reads_position = true;
                }
            }
            Expr::Unary(_, inner) => inner.collect(refs),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect(refs);
                rhs.collect(refs);
            }
            Expr::Builtin(builtin) => {
                if let Some(t) = builtin.queried_type() {
                    refs.types.insert(t.to_string());
                    refs.populations.insert(t.to_string());
                    refs.reads_position = true;
                }
                match builtin {
                    Builtin::HasProperty(name) => {
                        refs.properties.insert(name.clone());
                    }
                    Builtin::IsType(t) => {
                        refs.types.insert(t.clone());
                        refs.reads_type_tag = true;
                    }
                    Builtin::CanMoveTo(..) | Builtin::HasSupportBelow => {
                        refs.reads_position = true;
                    }
                    _ => {}
                }
                for arg in builtin.args() {
                    arg.collect(refs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_collect_types_and_properties() {
        let expr = Expr::Binary(
            BinaryOp::And,
            Box::new(Expr::Builtin(Builtin::AdjacentTo("box".into()))),
            Box::new(Expr::Attribute(Attribute::Property("movable".into()))),
        );
        let refs = expr.references();
        assert!(refs.types.contains("box"));
        assert!(refs.populations.contains("box"));
        assert!(refs.properties.contains("movable"));
        assert!(refs.reads_position);
        assert!(!refs.reads_heading);
    }

    #[test]
    fn test_is_type_reads_tag_not_population() {
        let refs = Expr::Builtin(Builtin::IsType("box".into())).references();
        assert!(refs.types.contains("box"));
        assert!(refs.populations.is_empty());
        assert!(refs.reads_type_tag);
    }

    #[test]
    fn test_type_compatibility() {
        assert!(Ty::Any.fits(Ty::Int));
        assert!(Ty::Int.fits(Ty::Any));
        assert!(!Ty::Str.fits(Ty::Int));
    }
}
