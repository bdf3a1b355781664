//! Condition language: compile text into typed expression trees and
//! evaluate them against a snapshot
//!
//! ```text
//! entity.type == 'box' && can_move_to(target_x, target_y)
//! count_entities_on_goals('box') == 2
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Expr, References, Ty};
pub use eval::{Bindings, EvalContext, EvalError, Evaluation};
pub use value::Value;

use eval::Evaluator;
use thiserror::Error;

/// Errors raised while compiling condition text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error at offset {position} near '{token}': {message}")]
    Syntax {
        token: String,
        position: usize,
        message: String,
    },

    #[error("semantic error at offset {position}: {message}")]
    Semantic { position: usize, message: String },
}

/// A compiled expression together with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub source: String,
    pub expr: Expr,
}

/// Compile text that must produce a boolean
pub fn compile_condition(source: &str) -> Result<Condition, CompileError> {
    let condition = compile_expression(source)?;
    let ty = condition.expr.ty();
    if !ty.fits(Ty::Bool) {
        return Err(CompileError::Semantic {
            position: 0,
            message: format!("condition must be bool, found {}", ty),
        });
    }
    Ok(condition)
}

/// Compile text of any type, as used for action values
pub fn compile_expression(source: &str) -> Result<Condition, CompileError> {
    Ok(Condition {
        source: source.to_string(),
        expr: parser::parse(source)?,
    })
}

impl Condition {
    /// Evaluate as a boolean, returning the bindings the action may consume
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Evaluation, EvalError> {
        let mut evaluator = Evaluator::new(*ctx);
        let satisfied = evaluator.eval(&self.expr)?.is_truthy();
        Ok(Evaluation {
            satisfied,
            bindings: evaluator.into_bindings(),
        })
    }

    /// Evaluate to a value
    pub fn value(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        Evaluator::new(*ctx).eval(&self.expr)
    }

    pub fn references(&self) -> References {
        self.expr.references()
    }
}
