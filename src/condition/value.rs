//! Runtime values produced by the evaluator

use crate::world::entity::PropertyValue;
use serde::Serialize;

/// Result of evaluating an expression node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Missing property, or a subject attribute read without a subject
    Null,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }

    /// Convert to a storable property; `Null` has no property form
    pub fn into_property(self) -> Option<PropertyValue> {
        match self {
            Value::Bool(b) => Some(PropertyValue::Bool(b)),
            Value::Int(n) => Some(PropertyValue::Int(n)),
            Value::Str(s) => Some(PropertyValue::Str(s)),
            Value::Null => None,
        }
    }
}

impl From<&PropertyValue> for Value {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Int(n) => Value::Int(*n),
            PropertyValue::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Null => f.write_str("null"),
        }
    }
}
