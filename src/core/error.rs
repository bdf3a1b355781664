use crate::condition::{CompileError, EvalError};
use crate::core::types::EntityId;
use crate::rules::ValidationError;
use crate::world::WorldError;
use thiserror::Error;

/// Errors raised while loading a document into a simulation
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document has no grid")]
    MissingGrid,

    #[error("invalid initial world: {0}")]
    World(#[from] WorldError),

    #[error("entity id '{0}' uses the reserved character '#'")]
    ReservedId(EntityId),

    #[error("player entity '{0}' does not exist")]
    UnknownPlayer(EntityId),

    #[error("invalid rule set: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by `step` and `submit_input`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("unknown input '{0}' (expected up, down, left, right or wait)")]
    UnknownInput(String),

    #[error("document declares no player entity")]
    NoPlayer,

    #[error("player entity '{0}' is no longer in the world")]
    PlayerGone(EntityId),
}

/// Errors raised by an ad-hoc query against the current snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Undo or redo requested with nothing to restore
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no snapshot in history")]
pub struct HistoryEmptyError;

/// Errors raised while reading engine configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}
