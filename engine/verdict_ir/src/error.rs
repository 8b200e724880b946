//! The single error kind surfaced by the engine.

use thiserror::Error;

/// Result alias used across the engine crates.
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Error surfaced by compilation or evaluation.
///
/// `ValueMissing` is the only recoverable variant: the arrow filter
/// treats it as "element excluded" and the left operand of a logical
/// OR treats it as `false`. Everything else is structural and
/// propagates to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Syntax error from the lexer/parser layer.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// A type name or Rust type was used without registration.
    #[error("unregistered type: {0}")]
    UnregisteredType(String),

    /// No instantiator matches (symbol, operand types).
    #[error("operator not found: {symbol} on types {left} and {right}")]
    OperatorNotFound {
        symbol: String,
        left: String,
        right: String,
    },

    /// A typed accessor was used on a node of a different runtime
    /// type, or choice branches disagree.
    #[error("expression {expr} is not of type {expected} but {actual}")]
    TypeMismatch {
        expr: String,
        expected: String,
        actual: String,
    },

    /// A fact name unknown to the context at evaluation time.
    #[error("fact has not been set: {0}")]
    MissingFact(String),

    /// An optional value is absent; recoverable by filters and OR.
    #[error("invalid or missing data to compute the formula: {0}")]
    ValueMissing(String),

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FormulaError {
    /// Whether the arrow filter / logical OR may swallow this error.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FormulaError::ValueMissing(_))
    }
}
