//! Error types for factflow.
//!
//! Errors are split by phase. Authoring mistakes surface as
//! [`CompileError`] when a block is compiled, and never at query time.
//! Problems while a transaction is running surface as [`RuntimeError`]; by
//! the time one is returned the transaction has already been rolled back.

use thiserror::Error;

use crate::change::{Round, TransactionId};
use crate::value::{Id, RawValue};

/// Errors raised while compiling a block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Attempting to unify two disparate static values: `{left}` and `{right}`")]
    DisparateValues {
        left: RawValue,
        right: RawValue,
    },

    #[error("Reference {reference} is used in a scope that does not descend from the scope that created it")]
    UnownedReference {
        reference: u32,
    },

    #[error("Branch {branch} returns {actual} values, expected {expected}")]
    BranchArity {
        branch: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Block '{block}' compiles to zero constraints")]
    EmptyBlock {
        block: String,
    },

    #[error("Unknown function '{name}'")]
    UnknownFunction {
        name: String,
    },

    #[error("Function '{name}' expects {expected} arguments, got {actual}")]
    FunctionArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Function '{name}' is a filter and has no return value")]
    FilterHasNoValue {
        name: String,
    },

    #[error("Records can only be added in the root scope of a block")]
    AddInSubBlock,

    #[error("Reference {reference} is not a record")]
    NotARecord {
        reference: u32,
    },

    #[error("Attribute '{attribute}' is read before being set on a record that is being created")]
    UnsetAttribute {
        attribute: String,
    },

    #[error("Unable to unify variables after {rounds} rounds")]
    UnifyDiverged {
        rounds: usize,
    },

    #[error("Block '{block}' uses register {register} that nothing ever provides")]
    UnboundVariable {
        block: String,
        register: usize,
    },

    #[error("Block '{block}' is unstratifiable: its aggregates, choices or unions depend on each other cyclically")]
    Unstratifiable {
        block: String,
    },
}

/// Errors raised while executing a transaction.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Fact ({e}, {a}, {v}) has negative multiplicity {count} after round {round}")]
    DistinctViolation {
        e: Id,
        a: Id,
        v: Id,
        round: Round,
        count: i64,
    },

    #[error("Transaction {transaction} did not reach a fixed point within {limit} rounds")]
    RoundLimit {
        transaction: TransactionId,
        limit: u32,
    },

    #[error("Unknown watch block '{name}'")]
    UnknownWatch {
        name: String,
    },

    #[error("Must have at least one watch block to export diffs")]
    NoWatchBlock,

    #[error("Join stalled in block '{block}': no constraint is ready")]
    JoinStalled {
        block: String,
    },

    #[error("Diff stream '{watch}' is disconnected")]
    Disconnected {
        watch: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for factflow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl FlowError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a compile error.
    #[must_use]
    pub const fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }

    /// Returns true if this is a runtime error.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// The compile error, if this is one.
    #[must_use]
    pub const fn as_compile(&self) -> Option<&CompileError> {
        match self {
            Self::Compile(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if retrying the same call might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::Timeout { .. }))
    }
}

/// Result type alias for factflow operations.
pub type FlowResult<T> = Result<T, FlowError>;
