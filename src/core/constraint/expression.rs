//! Constraints expressed as boolean conditions over input and context

use super::{Check, Constraint, ConstraintSpec, Property, VariableSpec};
use crate::core::error::ConstraintError;
use crate::core::expression::{Expression, Value, Variables};

/// Boolean expression over user input and context
///
/// Each declared variable becomes an input property, bound as
/// `input.<name>` when the check is evaluated. A typical use is a
/// justification check such as `input.justification.matches('^b/[0-9]+$')`.
#[derive(Debug, Clone)]
pub struct ExpressionConstraint {
    name: String,
    display_name: String,
    variables: Vec<VariableSpec>,
    expression: Expression,
}

impl ExpressionConstraint {
    /// Compile the expression; a syntax error is reported as
    /// [`ConstraintError::InvalidExpression`]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        variables: Vec<VariableSpec>,
        expression: &str,
    ) -> Result<Self, ConstraintError> {
        let name = name.into();
        let expression =
            Expression::compile(expression).map_err(|source| ConstraintError::InvalidExpression {
                constraint: name.clone(),
                source,
            })?;

        Ok(ExpressionConstraint {
            name,
            display_name: display_name.into(),
            variables,
            expression,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }
}

impl Constraint for ExpressionConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn create_check(&self) -> Box<dyn Check + '_> {
        Box::new(ExpressionCheck {
            constraint: self,
            input: self.variables.iter().map(VariableSpec::to_property).collect(),
            context: Variables::new(),
        })
    }

    fn to_spec(&self) -> ConstraintSpec {
        ConstraintSpec::Expression {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            expression: self.expression.source().to_string(),
            variables: self.variables.clone(),
        }
    }
}

struct ExpressionCheck<'a> {
    constraint: &'a ExpressionConstraint,
    input: Vec<Property>,
    context: Variables,
}

impl Check for ExpressionCheck<'_> {
    fn constraint(&self) -> &dyn Constraint {
        self.constraint
    }

    fn input(&self) -> &[Property] {
        &self.input
    }

    fn input_mut(&mut self) -> &mut [Property] {
        &mut self.input
    }

    fn add_context(&mut self, name: &str, value: Value) {
        self.context.insert(name, value);
    }

    fn evaluate(self: Box<Self>) -> Result<bool, ConstraintError> {
        let ExpressionCheck {
            constraint,
            input,
            mut context,
        } = *self;

        for property in &input {
            match property.value() {
                Some(value) if property.is_within_bounds() => {
                    context.insert_field("input", property.name(), Value::from(value));
                }
                Some(_) => return Ok(false),
                None if property.is_required() => return Ok(false),
                None => {}
            }
        }

        // `input` must exist even when every variable is optional and unset
        if !context.contains("input") {
            context.insert("input", Value::map(Vec::<(String, Value)>::new()));
        }

        constraint
            .expression
            .evaluate_bool(&context)
            .map_err(|source| ConstraintError::Evaluation {
                constraint: constraint.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn justification(pattern: &str) -> ExpressionConstraint {
        ExpressionConstraint::new(
            "justification",
            "You must provide a justification",
            vec![VariableSpec::string("justification", "Justification", 1, 100)],
            &format!("input.justification.matches('{}')", pattern),
        )
        .unwrap()
    }

    #[test]
    fn test_justification_pattern() {
        let constraint = justification("^b/[0-9]+$");

        let mut check = constraint.create_check();
        check.set_input("justification", "b/12345").unwrap();
        assert!(check.evaluate().unwrap());

        let mut check = constraint.create_check();
        check.set_input("justification", "because").unwrap();
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_missing_required_input_is_unsatisfied() {
        let constraint = justification(".*");
        let check = constraint.create_check();
        assert_eq!(check.missing_input(), vec!["justification".to_string()]);
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_length_bounds() {
        let constraint = justification(".*");
        let mut check = constraint.create_check();
        check.set_input("justification", &"x".repeat(101)).unwrap();
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_invalid_regex_is_an_error_not_a_denial() {
        let constraint = justification("(unclosed");
        let mut check = constraint.create_check();
        check.set_input("justification", "anything").unwrap();
        assert!(matches!(
            check.evaluate(),
            Err(ConstraintError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_context_binding() {
        let constraint = ExpressionConstraint::new(
            "internal-only",
            "Only example.com users",
            vec![],
            "subject.email.endsWith('@example.com')",
        )
        .unwrap();

        let mut check = constraint.create_check();
        check.add_context(
            "subject",
            Value::map([("email", Value::from("alice@example.com"))]),
        );
        assert!(check.evaluate().unwrap());

        let mut check = constraint.create_check();
        check.add_context(
            "subject",
            Value::map([("email", Value::from("mallory@example.org"))]),
        );
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_typed_variables() {
        let constraint = ExpressionConstraint::new(
            "ack",
            "Acknowledge",
            vec![
                VariableSpec::boolean("acknowledged", "I understand"),
                VariableSpec::int("severity", "Severity", 1, 5),
            ],
            "input.acknowledged && input.severity >= 3",
        )
        .unwrap();

        let mut check = constraint.create_check();
        check.set_input("acknowledged", "true").unwrap();
        check.set_input("severity", "4").unwrap();
        assert!(check.evaluate().unwrap());

        let mut check = constraint.create_check();
        check.set_input("acknowledged", "true").unwrap();
        check.set_input("severity", "9").unwrap();
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_spec_keeps_source() {
        let constraint = justification(".*");
        let ConstraintSpec::Expression { expression, .. } = constraint.to_spec() else {
            panic!("expected an expression constraint");
        };
        assert_eq!(expression, "input.justification.matches('.*')");
    }
}
