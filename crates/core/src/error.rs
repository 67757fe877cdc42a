//! Error types for the aspect resolution engine.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Every variant is a programmer error: nothing here is caught internally,
//! each one surfaces to whoever called `call` or `input_context`.

use thiserror::Error;

use crate::aspect::Priority;

/// The top-level error type for all aspectflow operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Context algebra ---
    #[error("Conflicting values with the same priority ({priority}) for argument: {name}")]
    ConflictingBinding { name: String, priority: Priority },

    #[error("Unused argument: {0}")]
    UnusedArgument(String),

    #[error("Aspect {name} was initialized with different values ({first} and {second})")]
    InconsistentAspectValue {
        name: String,
        first: String,
        second: String,
    },

    // --- Composition ---
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),

    // --- Argument binding ---
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    // --- Evaluation ---
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvalError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Failure raised from inside an operation body.
    pub fn operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Evaluation(EvalError::Operation {
            operation: operation.into(),
            reason: reason.into(),
        })
    }

    /// A value of the wrong kind reached a parameter.
    pub fn type_mismatch(
        parameter: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Error::Evaluation(EvalError::TypeMismatch {
            parameter: parameter.into(),
            expected,
            found: found.into(),
        })
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BindingError {
    #[error("{operation}() missing required argument: {parameter}")]
    MissingArgument { operation: String, parameter: String },

    #[error("{operation}() takes {expected} positional arguments but {given} were given")]
    TooManyArguments {
        operation: String,
        expected: usize,
        given: usize,
    },

    #[error("{operation}() got an unexpected keyword argument: {parameter}")]
    UnknownParameter { operation: String, parameter: String },

    #[error("{operation}() got multiple values for argument: {parameter}")]
    DuplicateArgument { operation: String, parameter: String },

    #[error("Aspect already bound as '{bound}', cannot rebind as '{requested}'")]
    AspectRebound { bound: String, requested: String },

    #[error("Aspect has no name: {0}")]
    UnnamedAspect(String),

    #[error("Operation not found: {0}")]
    UnknownOperation(String),

    #[error("Operation already lazified: {0}")]
    AlreadyLazified(String),
}

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Cyclic deferred call: {operation} is already being evaluated")]
    Cycle { operation: String },

    #[error("Maximum evaluation depth {max_depth} exceeded while evaluating {operation}")]
    RecursionLimit { operation: String, max_depth: usize },

    #[error("Argument {parameter} expected {expected}, found {found}")]
    TypeMismatch {
        parameter: String,
        expected: &'static str,
        found: String,
    },

    #[error("Operation {operation} failed: {reason}")]
    Operation { operation: String, reason: String },
}
