//! Tree-walking evaluator

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::cache::RegexCache;
use super::value::Value;
use crate::core::error::ExpressionError;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

type EvalResult = Result<Value, ExpressionError>;

pub(crate) struct Evaluator<'a> {
    variables: &'a BTreeMap<String, Value>,
    regexes: &'a RegexCache,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(variables: &'a BTreeMap<String, Value>, regexes: &'a RegexCache) -> Self {
        Evaluator { variables, regexes }
    }

    pub(crate) fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Double(d) => Value::Double(*d),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Ident(name) => self.variables.get(name).cloned().ok_or_else(|| {
                ExpressionError::eval(format!("undeclared reference to '{}'", name))
            }),
            Expr::Member(target, field) => match self.eval(target)? {
                Value::Map(mut entries) => entries
                    .remove(field)
                    .ok_or_else(|| ExpressionError::eval(format!("no such key: {}", field))),
                other => Err(ExpressionError::eval(format!(
                    "cannot select field '{}' from {}",
                    field,
                    other.type_name()
                ))),
            },
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(target, index)
            }
            Expr::Call {
                target,
                function,
                args,
            } => match target {
                None if function == "has" => self.has(args),
                None => {
                    let args = self.eval_all(args)?;
                    call_function(function, args)
                }
                Some(receiver) => {
                    let receiver = self.eval(receiver)?;
                    let args = self.eval_all(args)?;
                    self.call_method(receiver, function, args)
                }
            },
            Expr::Unary(op, operand) => unary(*op, self.eval(operand)?),
            Expr::Binary(left, BinaryOp::And, right) => self.logical(left, right, false),
            Expr::Binary(left, BinaryOp::Or, right) => self.logical(left, right, true),
            Expr::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::Ternary(cond, then, otherwise) => match self.eval(cond)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                other => Err(ExpressionError::eval(format!(
                    "ternary condition must be bool, got {}",
                    other.type_name()
                ))),
            },
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        Value::Int(i) => i.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(ExpressionError::eval(format!(
                                "unsupported map key type {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, ExpressionError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn has(&self, args: &[Expr]) -> EvalResult {
        match args {
            [Expr::Member(target, field)] => match self.eval(target)? {
                Value::Map(entries) => Ok(Value::Bool(entries.contains_key(field))),
                other => Err(ExpressionError::eval(format!(
                    "has() cannot test field of {}",
                    other.type_name()
                ))),
            },
            _ => Err(ExpressionError::eval("invalid argument to has()")),
        }
    }

    /// `&&` and `||`: an error on one side is absorbed if the other side
    /// alone decides the result
    fn logical(&self, left: &Expr, right: &Expr, is_or: bool) -> EvalResult {
        let decisive = is_or;
        let left = self.eval(left).and_then(expect_bool);
        if left == Ok(decisive) {
            return Ok(Value::Bool(decisive));
        }
        let right = self.eval(right).and_then(expect_bool);
        if right == Ok(decisive) {
            return Ok(Value::Bool(decisive));
        }
        left?;
        right?;
        Ok(Value::Bool(!decisive))
    }

    fn call_method(&self, receiver: Value, method: &str, args: Vec<Value>) -> EvalResult {
        match (receiver, method, args.as_slice()) {
            (Value::String(s), "matches", [Value::String(pattern)]) => {
                let regex = self.compile(pattern)?;
                Ok(Value::Bool(regex.is_match(&s)))
            }
            (Value::String(s), "startsWith", [Value::String(prefix)]) => {
                Ok(Value::Bool(s.starts_with(prefix.as_str())))
            }
            (Value::String(s), "endsWith", [Value::String(suffix)]) => {
                Ok(Value::Bool(s.ends_with(suffix.as_str())))
            }
            (Value::String(s), "contains", [Value::String(part)]) => {
                Ok(Value::Bool(s.contains(part.as_str())))
            }
            (Value::String(s), "lowerAscii", []) => Ok(Value::String(s.to_ascii_lowercase())),
            (Value::String(s), "upperAscii", []) => Ok(Value::String(s.to_ascii_uppercase())),
            (Value::String(s), "trim", []) => Ok(Value::String(s.trim().to_string())),
            (Value::String(s), "extract", [Value::String(template)]) => self.extract(&s, template),
            (receiver, "size", []) => size(receiver),
            (receiver, method, args) => Err(ExpressionError::eval(format!(
                "no matching overload for {}.{}({})",
                receiver.type_name(),
                method,
                args.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    fn compile(&self, pattern: &str) -> Result<regex::Regex, ExpressionError> {
        self.regexes
            .get_or_compile(pattern)
            .map_err(|e| ExpressionError::eval(format!("invalid pattern '{}': {}", pattern, e)))
    }

    /// Match `value` against a template such as `{handle}@example.com` and
    /// return the part that corresponds to the placeholder
    fn extract(&self, value: &str, template: &str) -> EvalResult {
        let open = template.find('{');
        let close = template.find('}');
        let (open, close) = match (open, close) {
            (Some(open), Some(close)) if open < close => (open, close),
            _ => {
                return Err(ExpressionError::eval(format!(
                    "extract template '{}' must contain one {{name}} placeholder",
                    template
                )))
            }
        };

        let prefix = &template[..open];
        let suffix = &template[close + 1..];
        if suffix.contains('{') || suffix.contains('}') {
            return Err(ExpressionError::eval(format!(
                "extract template '{}' must contain exactly one placeholder",
                template
            )));
        }

        let pattern = format!("^{}(.*){}$", regex::escape(prefix), regex::escape(suffix));
        let regex = self.compile(&pattern)?;
        regex
            .captures(value)
            .and_then(|c| c.get(1))
            .map(|m| Value::String(m.as_str().to_string()))
            .ok_or_else(|| {
                ExpressionError::eval(format!(
                    "'{}' does not match template '{}'",
                    value, template
                ))
            })
    }
}

fn expect_bool(value: Value) -> Result<bool, ExpressionError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExpressionError::eval(format!(
            "expected bool, got {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: Value, index: Value) -> EvalResult {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => usize::try_from(i)
            .ok()
            .and_then(|i| items.into_iter().nth(i))
            .ok_or_else(|| ExpressionError::eval(format!("index {} out of range", i))),
        (Value::Map(mut entries), Value::String(key)) => entries
            .remove(&key)
            .ok_or_else(|| ExpressionError::eval(format!("no such key: {}", key))),
        (target, index) => Err(ExpressionError::eval(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn size(value: Value) -> EvalResult {
    let len = match &value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => {
            return Err(ExpressionError::eval(format!(
                "size() not supported for {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn call_function(function: &str, args: Vec<Value>) -> EvalResult {
    match (function, args.as_slice()) {
        ("timestamp", [Value::String(s)]) => parse_timestamp(s).map(Value::Timestamp),
        ("timestamp", [Value::Timestamp(t)]) => Ok(Value::Timestamp(*t)),
        ("duration", [Value::String(s)]) => parse_go_duration(s).map(Value::Duration),
        ("duration", [Value::Duration(d)]) => Ok(Value::Duration(*d)),
        ("int", [Value::Int(i)]) => Ok(Value::Int(*i)),
        ("int", [Value::Double(d)]) => Ok(Value::Int(d.trunc() as i64)),
        ("int", [Value::String(s)]) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| ExpressionError::eval(format!("cannot convert '{}' to int", s))),
        ("int", [Value::Timestamp(t)]) => Ok(Value::Int(t.timestamp())),
        ("double", [Value::Int(i)]) => Ok(Value::Double(*i as f64)),
        ("double", [Value::Double(d)]) => Ok(Value::Double(*d)),
        ("double", [Value::String(s)]) => s
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| ExpressionError::eval(format!("cannot convert '{}' to double", s))),
        ("string", [value]) => Ok(Value::String(value.to_string())),
        ("size", [value]) => size(value.clone()),
        (function, args) => Err(ExpressionError::eval(format!(
            "no matching overload for {}({})",
            function,
            args.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
        ))),
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ExpressionError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ExpressionError::eval(format!("invalid timestamp '{}': {}", s, e)))
}

/// Parse durations such as `300s`, `1h30m`, `1.5h` or `-10ms`
pub(crate) fn parse_go_duration(s: &str) -> Result<Duration, ExpressionError> {
    let invalid = || ExpressionError::eval(format!("invalid duration '{}'", s));

    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::zero());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += number * unit_nanos;
    }

    if total_nanos > i64::MAX as f64 {
        return Err(invalid());
    }
    let nanos = total_nanos.round() as i64;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

fn unary(op: UnaryOp, value: Value) -> EvalResult {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ExpressionError::eval("integer overflow")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Neg, Value::Duration(d)) => Ok(Value::Duration(-d)),
        (op, value) => Err(ExpressionError::eval(format!(
            "no matching overload for {:?} {}",
            op,
            value.type_name()
        ))),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn overflow() -> ExpressionError {
    ExpressionError::eval("arithmetic overflow")
}

fn binary(op: BinaryOp, left: Value, right: Value) -> EvalResult {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left.loosely_equals(&right))),
        BinaryOp::Ne => return Ok(Value::Bool(!left.loosely_equals(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                ExpressionError::eval(format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }));
        }
        BinaryOp::In => {
            return match right {
                Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.loosely_equals(&left)))),
                Value::Map(entries) => match left {
                    Value::String(key) => Ok(Value::Bool(entries.contains_key(&key))),
                    other => Err(ExpressionError::eval(format!(
                        "map keys are strings, got {}",
                        other.type_name()
                    ))),
                },
                other => Err(ExpressionError::eval(format!(
                    "'in' requires a list or map, got {}",
                    other.type_name()
                ))),
            }
        }
        _ => {}
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Div, Value::Int(_), Value::Int(0)) | (BinaryOp::Rem, Value::Int(_), Value::Int(0)) => {
            Err(ExpressionError::eval("division by zero"))
        }
        (BinaryOp::Div, Value::Int(a), Value::Int(b)) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Rem, Value::Int(a), Value::Int(b)) => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Add, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        (BinaryOp::Sub, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a - b)),
        (BinaryOp::Mul, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a * b)),
        (BinaryOp::Div, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a / b)),
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Add, Value::Timestamp(t), Value::Duration(d)) | (BinaryOp::Add, Value::Duration(d), Value::Timestamp(t)) => {
            t.checked_add_signed(d).map(Value::Timestamp).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Timestamp(t), Value::Duration(d)) => {
            t.checked_sub_signed(d).map(Value::Timestamp).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Timestamp(a), Value::Timestamp(b)) => Ok(Value::Duration(a - b)),
        (BinaryOp::Add, Value::Duration(a), Value::Duration(b)) => {
            a.checked_add(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            a.checked_sub(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (op, left, right) => Err(ExpressionError::eval(format!(
            "no matching overload for {} {} {}",
            left.type_name(),
            op.symbol(),
            right.type_name()
        ))),
    }
}
