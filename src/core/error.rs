//! Error types for policy evaluation, import and activation

use thiserror::Error;

/// Expression compile and evaluation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The expression text could not be parsed
    #[error("Invalid expression at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// The expression parsed, but failed while being evaluated
    #[error("Expression evaluation failed: {0}")]
    Evaluation(String),
}

impl ExpressionError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        ExpressionError::Evaluation(message.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemporaryConditionError {
    #[error("Not a temporary condition: {0}")]
    NotATemporaryCondition(String),

    #[error("Invalid time span: start {start} is after end {end}")]
    InvalidSpan { start: String, end: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("Invalid constraint bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid value for '{property}': {message}")]
    InvalidInput { property: String, message: String },

    #[error("Constraint '{constraint}' has an invalid expression: {source}")]
    InvalidExpression {
        constraint: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Evaluating constraint '{constraint}' failed: {source}")]
    Evaluation {
        constraint: String,
        #[source]
        source: ExpressionError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Duplicate name '{0}' among siblings")]
    DuplicateName(String),

    #[error("Policy node '{0}' does not permit adding children directly")]
    ReadOnly(String),

    #[error("Cannot merge '{left}' with '{right}': names differ")]
    NameMismatch { left: String, right: String },

    #[error("Invalid principal '{0}'")]
    InvalidPrincipal(String),

    #[error("Invalid permission '{0}'")]
    InvalidPermission(String),

    #[error("Invalid policy document: {0}")]
    InvalidDocument(String),

    #[error("Invalid constraint: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Loading groups of '{system}' failed: {message}")]
    Loader { system: String, message: String },
}

/// Reasons a single legacy binding cannot be mapped to a group
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Unrecognized role format: {0}")]
    UnrecognizedRole(String),

    #[error("Unsupported condition: {0}")]
    UnsupportedCondition(String),

    #[error("Invalid condition: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Invalid group: {0}")]
    Policy(#[from] PolicyError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Reading bindings failed: {0}")]
    Source(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActivationError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Constraints not satisfied: {}", .0.join(", "))]
    ConstraintsUnsatisfied(Vec<String>),

    #[error("Invalid proposal state: {0}")]
    InvalidState(String),

    #[error("Requester cannot approve their own request")]
    SelfApproval,

    #[error("Proposal expired at {0}")]
    Expired(String),
}

/// Top-level error for callers that don't care which layer failed
#[derive(Error, Debug)]
pub enum JitError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    TemporaryCondition(#[from] TemporaryConditionError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, JitError>;
