//! Constraints: named preconditions gating joins and approvals
//!
//! A [`Constraint`] is immutable policy data. Each join or approval attempt
//! asks it for a fresh [`Check`], fills in the check's input properties and
//! context, and evaluates it once. `evaluate` consumes the check, so a check
//! cannot be reused across attempts.
//!
//! Two kinds exist:
//! - [`ExpiryConstraint`]: how long an activation lasts, fixed or user-chosen
//! - [`ExpressionConstraint`]: a boolean expression over user input and context

mod expiry;
mod expression;
mod property;
mod spec;

pub use expiry::ExpiryConstraint;
pub use expression::ExpressionConstraint;
pub use property::{
    format_iso_duration, parse_iso_duration, HumanDuration, Property, PropertyType,
    PropertyValue,
};
pub use spec::{ConstraintSpec, VariableKind, VariableSpec};

pub(crate) use spec::iso_duration;

use crate::core::error::ConstraintError;
use crate::core::expression::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// When a constraint applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintClass {
    /// Checked for the user requesting to join
    Join,
    /// Checked for each reviewer approving a request
    Approve,
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintClass::Join => write!(f, "JOIN"),
            ConstraintClass::Approve => write!(f, "APPROVE"),
        }
    }
}

/// Constraints of a policy node, keyed by class; order within a class is
/// display order
pub type ConstraintMap = BTreeMap<ConstraintClass, Vec<Arc<dyn Constraint>>>;

/// A named, human-describable precondition
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Unique name within a policy node
    fn name(&self) -> &str;

    /// Text shown to users
    fn display_name(&self) -> String;

    /// Start a new single-use evaluation
    fn create_check(&self) -> Box<dyn Check + '_>;

    /// Serializable description of this constraint
    fn to_spec(&self) -> ConstraintSpec;

    /// Downcast used to determine the activation duration
    fn as_expiry(&self) -> Option<&ExpiryConstraint> {
        None
    }
}

/// Single-use evaluation of a constraint
pub trait Check {
    fn constraint(&self) -> &dyn Constraint;

    /// Properties the user may (or must) supply
    fn input(&self) -> &[Property];

    fn input_mut(&mut self) -> &mut [Property];

    /// Bind a context variable, such as `subject` or `group`
    fn add_context(&mut self, name: &str, value: Value);

    /// Evaluate the check
    ///
    /// `Ok(false)` means the constraint is not satisfied; an `Err` means the
    /// constraint itself is broken.
    fn evaluate(self: Box<Self>) -> Result<bool, ConstraintError>;

    /// Set the input property `name` from user-supplied text
    ///
    /// Returns `Ok(false)` if the check has no such property.
    fn set_input(&mut self, name: &str, text: &str) -> Result<bool, ConstraintError> {
        match self.input_mut().iter_mut().find(|p| p.name() == name) {
            Some(property) => property.set_text(text).map(|_| true),
            None => Ok(false),
        }
    }

    /// Names of required properties that have no value yet
    fn missing_input(&self) -> Vec<String> {
        self.input()
            .iter()
            .filter(|p| p.is_required() && !p.is_set())
            .map(|p| p.name().to_string())
            .collect()
    }
}
