//! # Error taxonomy
//!
//! A single [`EngineError`] realizes the error kinds named in the design
//! (`TypeMismatch`, `UniverseMismatch`, `UniverseContradiction`,
//! `SchemaMismatch`, `UnknownColumn`, `OutOfScope`, `EngineFailure`,
//! `InvariantViolation`). Only [`EngineError::OutOfScope`] is meant to be
//! caught and recovered from by callers (e.g. `has_column`/`has_universe`
//! probes on [`crate::scope::ScopeState`]); every other variant propagates.

use crate::universe::UniverseContradiction;
use crate::value::{DType, TypeError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("type mismatch in column `{column}`: {source}")]
    TypeMismatch { column: String, source: TypeError },

    #[error(
        "columns from different universes used together without a bridge; \
         consider `with_universe_of` or a `promise_*` call"
    )]
    UniverseMismatch,

    #[error("universe promise contradicts a previously established fact: {0}")]
    UniverseContradiction(#[from] UniverseContradiction),

    #[error("schema mismatch: columns differ by {symmetric_difference:?}")]
    SchemaMismatch { symmetric_difference: Vec<String> },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// Recoverable: the entity was never materialized in this scope.
    #[error("entity out of scope")]
    OutOfScope,

    #[error("downstream engine failure: {0}")]
    EngineFailure(String),

    /// Fatal: a monotonicity or idempotence invariant was violated. This
    /// indicates a bug in the frontend itself, never user input.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// `run()`/`run_all()` exceeded the [`crate::execution::RunOptions`]
    /// timeout or were cancelled via a [`crate::execution::CancelHandle`].
    #[error("run cancelled: {0}")]
    Timeout(#[from] crate::execution::TimeoutError),

    /// A [`crate::execution::ResourceLimits`] bound was exceeded during
    /// `run()`/`run_all()`.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(#[from] crate::execution::ResourceError),
}

impl EngineError {
    pub fn is_out_of_scope(&self) -> bool {
        matches!(self, EngineError::OutOfScope)
    }

    pub fn type_mismatch(column: impl Into<String>, source: TypeError) -> Self {
        EngineError::TypeMismatch {
            column: column.into(),
            source,
        }
    }

    pub fn schema_mismatch(symmetric_difference: Vec<String>) -> Self {
        EngineError::SchemaMismatch {
            symmetric_difference,
        }
    }

    pub fn unknown_column(name: impl Into<String>) -> Self {
        EngineError::UnknownColumn(name.into())
    }
}

/// Shorthand used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Used by operators that need to report the narrowed/expected dtype
/// alongside a plain [`EngineError::TypeMismatch`].
pub fn type_mismatch(column: impl Into<String>, left: DType, right: DType) -> EngineError {
    EngineError::type_mismatch(column, TypeError { left, right })
}
