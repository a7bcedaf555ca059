//! Expression engine for constraint predicates and time-bound conditions
//!
//! A restricted, CEL-like language:
//! - Boolean, arithmetic and comparison operators, ternaries, `in`
//! - String methods (`matches`, `startsWith`, `extract`, ...)
//! - `timestamp()` / `duration()` with time arithmetic
//! - `request.time` bound to the evaluation instant unless overridden
//!
//! Compile errors ([`ExpressionError::Parse`]) and runtime errors
//! ([`ExpressionError::Evaluation`]) are distinct.

mod ast;
mod cache;
mod eval;
mod lexer;
mod parser;
mod split;
mod value;

pub use ast::{BinaryOp, Expr, Literal, UnaryOp};
pub use cache::RegexCache;
pub use split::{split_and, strip_comments};
pub use value::Value;

pub(crate) use eval::parse_timestamp;

use crate::core::error::ExpressionError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Named values an expression is evaluated against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a top-level variable, replacing any previous binding
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`Variables::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind `root.field`, creating `root` as a map if necessary
    pub fn insert_field(
        &mut self,
        root: &str,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let entry = self
            .values
            .entry(root.to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if !matches!(entry, Value::Map(_)) {
            *entry = Value::Map(BTreeMap::new());
        }
        if let Value::Map(map) = entry {
            map.insert(field.into(), value.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Copy of these variables with `request.time` defaulted to `now`
    fn with_request_time(&self, now: DateTime<Utc>) -> BTreeMap<String, Value> {
        let mut values = self.values.clone();
        let request = values
            .entry("request".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if let Value::Map(fields) = request {
            fields
                .entry("time".to_string())
                .or_insert(Value::Timestamp(now));
        }
        values
    }
}

/// A parsed expression, ready to be evaluated any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression
    ///
    /// # Examples
    ///
    /// ```
    /// use jit_policy::expression::{Expression, Variables};
    ///
    /// let expr = Expression::compile("input.reason.matches('^[A-Z]+-[0-9]+$')").unwrap();
    /// let mut vars = Variables::new();
    /// vars.insert_field("input", "reason", "BUG-42");
    /// assert!(expr.evaluate_bool(&vars).unwrap());
    /// ```
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let ast = parser::parse(source)?;
        Ok(Expression {
            source: source.to_string(),
            ast,
        })
    }

    /// Original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate with `request.time` defaulting to the current time
    pub fn evaluate(&self, variables: &Variables) -> Result<Value, ExpressionError> {
        self.evaluate_at(variables, Utc::now())
    }

    /// Evaluate with `request.time` defaulting to `now`
    pub fn evaluate_at(
        &self,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> Result<Value, ExpressionError> {
        let bound = variables.with_request_time(now);
        eval::Evaluator::new(&bound, RegexCache::shared()).eval(&self.ast)
    }

    pub fn evaluate_bool(&self, variables: &Variables) -> Result<bool, ExpressionError> {
        self.evaluate_bool_at(variables, Utc::now())
    }

    /// Evaluate and require a boolean result
    pub fn evaluate_bool_at(
        &self,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> Result<bool, ExpressionError> {
        match self.evaluate_at(variables, now)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::Evaluation(format!(
                "expected a bool result, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Prints the canonical form
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

/// Parse and pretty-print an expression with normalized whitespace
///
/// ```
/// use jit_policy::expression::reformat;
///
/// assert_eq!(
///     reformat("resource.name=='x'&&(a||b)").unwrap(),
///     "resource.name == \"x\" && (a || b)"
/// );
/// ```
pub fn reformat(source: &str) -> Result<String, ExpressionError> {
    Ok(Expression::compile(source)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn eval(source: &str, vars: &Variables) -> Result<Value, ExpressionError> {
        Expression::compile(source)?.evaluate(vars)
    }

    fn eval_true(source: &str) -> bool {
        eval(source, &Variables::new()).unwrap() == Value::Bool(true)
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert!(eval_true("1 + 2 * 3 == 7"));
        assert!(eval_true("(1 + 2) * 3 == 9"));
        assert!(eval_true("7 % 4 == 3"));
        assert!(eval_true("1.5 < 2"));
        assert!(eval_true("'a' + 'b' == 'ab'"));
        assert!(eval_true("!(1 > 2)"));
        assert!(eval_true("-3 < 0"));
        assert!(eval_true("2 in [1, 2, 3]"));
        assert!(eval_true("'k' in {'k': 1}"));
        assert!(eval_true("true ? 1 == 1 : false"));
    }

    #[test]
    fn test_string_methods() {
        assert!(eval_true("'alice@example.com'.endsWith('@example.com')"));
        assert!(eval_true("'alice'.startsWith('al')"));
        assert!(eval_true("'Alice'.lowerAscii() == 'alice'"));
        assert!(eval_true("'abc'.size() == 3"));
        assert!(eval_true("size([1, 2]) == 2"));
        assert!(eval_true("'BUG-123'.matches('^[A-Z]+-[0-9]+$')"));
        assert!(!eval_true("'nope'.matches('^[A-Z]+-[0-9]+$')"));
    }

    #[test]
    fn test_extract() {
        assert!(eval_true(
            "'alice@example.com'.extract('{handle}@example.com') == 'alice'"
        ));
        assert!(eval("'alice@other.com'.extract('{handle}@example.com')", &Variables::new()).is_err());
        assert!(eval("'x'.extract('no placeholder')", &Variables::new()).is_err());
    }

    #[test]
    fn test_variables_and_has() {
        let mut vars = Variables::new();
        vars.insert_field("subject", "email", "bob@example.com");
        vars.insert("level", 3i64);

        assert_eq!(
            eval("subject.email", &vars).unwrap(),
            Value::from("bob@example.com")
        );
        assert_eq!(eval("has(subject.email)", &vars).unwrap(), Value::Bool(true));
        assert_eq!(eval("has(subject.name)", &vars).unwrap(), Value::Bool(false));
        assert_eq!(eval("has({}.jitaccessconstraint)", &vars).unwrap(), Value::Bool(false));
        assert!(eval_true_with("level >= 3", &vars));
    }

    fn eval_true_with(source: &str, vars: &Variables) -> bool {
        eval(source, vars).unwrap() == Value::Bool(true)
    }

    #[test]
    fn test_request_time_default_and_override() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let expr = Expression::compile(
            "request.time >= timestamp('2024-06-01T00:00:00Z') && request.time < timestamp('2024-06-02T00:00:00Z')",
        )
        .unwrap();

        assert!(expr.evaluate_bool_at(&Variables::new(), now).unwrap());
        assert!(!expr
            .evaluate_bool_at(&Variables::new(), now + Duration::days(1))
            .unwrap());

        let mut vars = Variables::new();
        vars.insert_field("request", "time", now - Duration::days(1));
        assert!(!expr.evaluate_bool_at(&vars, now).unwrap());
    }

    #[test]
    fn test_time_arithmetic() {
        assert!(eval_true(
            "timestamp('2024-01-01T00:00:00Z') + duration('1h') == timestamp('2024-01-01T01:00:00Z')"
        ));
        assert!(eval_true(
            "timestamp('2024-01-01T01:00:00Z') - timestamp('2024-01-01T00:00:00Z') == duration('3600s')"
        ));
    }

    #[test]
    fn test_logical_error_absorption() {
        // The undeclared reference is absorbed because the other side decides
        assert!(eval_true("true || missing"));
        assert!(eval_true("!(false && missing)"));
        assert!(eval("true && missing", &Variables::new()).is_err());
    }

    #[test]
    fn test_compile_vs_evaluation_errors() {
        assert!(matches!(
            Expression::compile("a =="),
            Err(ExpressionError::Parse { .. })
        ));
        assert!(matches!(
            eval("missing", &Variables::new()),
            Err(ExpressionError::Evaluation(_))
        ));
        assert!(matches!(
            eval("1 / 0", &Variables::new()),
            Err(ExpressionError::Evaluation(_))
        ));
        assert!(matches!(
            eval("'x'.matches('(')", &Variables::new()),
            Err(ExpressionError::Evaluation(_))
        ));
    }

    #[test]
    fn test_evaluate_bool_rejects_non_bool() {
        let expr = Expression::compile("1 + 1").unwrap();
        assert!(expr.evaluate_bool(&Variables::new()).is_err());
    }

    #[test]
    fn test_reformat() {
        assert_eq!(reformat("  a==1&&b  ").unwrap(), "a == 1 && b");
        assert_eq!(reformat("x.f( 'q' , 2 )").unwrap(), "x.f(\"q\", 2)");
        assert_eq!(
            reformat("resource.name.startsWith(\"projects/_/buckets/b\") // bucket").unwrap(),
            "resource.name.startsWith(\"projects/_/buckets/b\")"
        );
        assert!(reformat("a &&").is_err());
    }

    #[test]
    fn test_long_conjunctions_fail_to_parse() {
        let chain = vec!["a"; 3_000].join("&&");
        assert!(matches!(reformat(&chain), Err(ExpressionError::Parse { .. })));

        let chain = vec!["true"; 4_000].join(" && ");
        assert!(matches!(
            Expression::compile(&chain),
            Err(ExpressionError::Parse { .. })
        ));
    }

    #[test]
    fn test_reformat_is_idempotent() {
        let once = reformat("(a||b)&&!c||d?e:f").unwrap();
        assert_eq!(reformat(&once).unwrap(), once);
    }

    #[test]
    fn test_reformat_doubles_in_plain_notation() {
        assert_eq!(
            reformat("x == 10000000000000000.0").unwrap(),
            "x == 10000000000000000.0"
        );
        assert_eq!(reformat("x < 0.0000001").unwrap(), "x < 0.0000001");
        assert_eq!(reformat("x == 1e16").unwrap(), "x == 10000000000000000.0");

        for source in ["x == 1e16", "x < 1e-7", "x > 2.5e300", "x == 3.0", "-0.0 == x"] {
            let once = reformat(source).unwrap();
            assert_eq!(reformat(&once).unwrap(), once, "{}", source);
        }
        assert!(eval_true("1e3 == 1000.0"));
    }
}
