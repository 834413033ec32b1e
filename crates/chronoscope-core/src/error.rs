//! Error types for the pure core.
//!
//! [`ValidationError`] covers malformed input rejected at its call site:
//! step payloads without a usable timestep and expressions that fail the
//! validation gate. [`EvaluationError`] covers everything that can go wrong
//! while turning an expression into a boolean. Neither is ever fatal.

/// Malformed input rejected before it reaches the reconciler or evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A step payload did not carry a timestep.
    #[error("step payload has no timestep")]
    MissingTimestep,

    /// A step payload carried a negative timestep.
    #[error("step payload has negative timestep {timestep}")]
    NegativeTimestep {
        /// The offending timestep.
        timestep: i64,
    },

    /// The expression is empty or whitespace only.
    #[error("expression is empty")]
    EmptyExpression,

    /// The expression exceeds the length limit.
    #[error("expression is {len} characters long (limit {max})")]
    ExpressionTooLong {
        /// Actual length in bytes.
        len: usize,
        /// Maximum accepted length in bytes.
        max: usize,
    },

    /// The expression contains a character outside the allow-list.
    #[error("disallowed character {ch:?} at offset {offset}")]
    DisallowedCharacter {
        /// The rejected character.
        ch: char,
        /// Byte offset of the character.
        offset: usize,
    },

    /// The expression names a host object or reserved word.
    #[error("forbidden identifier `{name}`")]
    ForbiddenIdentifier {
        /// The rejected identifier.
        name: String,
    },

    /// The expression references a variable outside the binding set.
    #[error("unknown identifier `{name}` (bindings: t, state, country, avg)")]
    UnboundIdentifier {
        /// The rejected identifier.
        name: String,
    },

    /// A trigger draft has no name.
    #[error("trigger draft has an empty name")]
    EmptyTriggerName,
}

/// Failure to evaluate a condition expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// The validation gate rejected the expression; it was never evaluated.
    #[error("expression rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// The expression passed the gate but does not parse.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset where parsing failed.
        offset: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// A fault occurred while interpreting the expression.
    #[error("evaluation failed: {message}")]
    Runtime {
        /// Description of the fault.
        message: String,
    },
}

impl EvaluationError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Whether the expression was rejected before any evaluation happened.
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Syntax { .. })
    }
}
