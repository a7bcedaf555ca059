//! Constraint on how long an activation may last

use super::{Check, Constraint, ConstraintSpec, HumanDuration, Property, PropertyType, PropertyValue};
use crate::core::error::ConstraintError;
use crate::core::expression::Value;
use chrono::Duration;

/// Limits how long an activation lasts
///
/// With `min == max` the duration is fixed and the user is not asked for
/// anything. Otherwise the user picks a duration within `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryConstraint {
    min: Duration,
    max: Duration,
}

impl ExpiryConstraint {
    /// Name of the constraint and of its input property
    pub const NAME: &'static str = "expiry";

    pub fn new(min: Duration, max: Duration) -> Result<Self, ConstraintError> {
        if min < Duration::zero() || max < Duration::zero() {
            return Err(ConstraintError::InvalidBounds(
                "expiry bounds must not be negative".to_string(),
            ));
        }
        if min > max {
            return Err(ConstraintError::InvalidBounds(format!(
                "minimum expiry {} exceeds maximum {}",
                HumanDuration(&min),
                HumanDuration(&max)
            )));
        }
        Ok(ExpiryConstraint { min, max })
    }

    pub fn fixed(duration: Duration) -> Result<Self, ConstraintError> {
        Self::new(duration, duration)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// Duration chosen by the inputs of a check, or the fixed duration
    ///
    /// Returns `None` if a variable duration was not supplied or lies outside
    /// the bounds.
    pub fn extract_expiry(&self, input: &[Property]) -> Option<Duration> {
        if self.is_fixed() {
            return Some(self.min);
        }

        input
            .iter()
            .find(|p| p.name() == Self::NAME && p.is_within_bounds())
            .and_then(|p| match p.value() {
                Some(PropertyValue::Duration(d)) => Some(*d),
                _ => None,
            })
    }
}

impl Constraint for ExpiryConstraint {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn display_name(&self) -> String {
        if self.is_fixed() {
            format!("Access expires after {}", HumanDuration(&self.min))
        } else {
            format!(
                "Choose an expiry between {} and {}",
                HumanDuration(&self.min),
                HumanDuration(&self.max)
            )
        }
    }

    fn create_check(&self) -> Box<dyn Check + '_> {
        let input = if self.is_fixed() {
            Vec::new()
        } else {
            vec![Property::new(
                Self::NAME,
                "Expiry",
                PropertyType::Duration {
                    min: Some(self.min),
                    max: Some(self.max),
                },
                true,
            )]
        };
        Box::new(ExpiryCheck {
            constraint: self,
            input,
        })
    }

    fn to_spec(&self) -> ConstraintSpec {
        ConstraintSpec::Expiry {
            min: self.min,
            max: self.max,
        }
    }

    fn as_expiry(&self) -> Option<&ExpiryConstraint> {
        Some(self)
    }
}

struct ExpiryCheck<'a> {
    constraint: &'a ExpiryConstraint,
    input: Vec<Property>,
}

impl Check for ExpiryCheck<'_> {
    fn constraint(&self) -> &dyn Constraint {
        self.constraint
    }

    fn input(&self) -> &[Property] {
        &self.input
    }

    fn input_mut(&mut self) -> &mut [Property] {
        &mut self.input
    }

    fn add_context(&mut self, _name: &str, _value: Value) {}

    fn evaluate(self: Box<Self>) -> Result<bool, ConstraintError> {
        Ok(self.constraint.extract_expiry(&self.input).is_some())
    }
}
