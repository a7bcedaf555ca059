//! Expression syntax tree and its canonical printer

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::In => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
        }
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

const TERNARY_PRECEDENCE: u8 = 0;
const UNARY_PRECEDENCE: u8 = 6;
const POSTFIX_PRECEDENCE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// Global function (`target` is `None`) or receiver-style method call
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Ternary(..) => TERNARY_PRECEDENCE,
            Expr::Binary(_, op, _) => op.precedence(),
            Expr::Unary(..) => UNARY_PRECEDENCE,
            _ => POSTFIX_PRECEDENCE,
        }
    }

    /// Top-level conjuncts of this expression, left to right
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary(left, BinaryOp::And, right) => {
                let mut clauses = left.conjuncts();
                clauses.extend(right.conjuncts());
                clauses
            }
            other => vec![other],
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Double(d) => {
                // Plain notation with a fraction so the output lexes as a double
                let text = d.to_string();
                if text.contains(|c: char| c == '.' || (!c.is_ascii_digit() && c != '-')) {
                    f.write_str(&text)
                } else {
                    write!(f, "{}.0", text)
                }
            }
            Literal::String(s) => write_quoted(f, s),
        }
    }
}

/// Canonical form: single spaces around binary operators, double-quoted
/// strings, parentheses only where precedence requires them.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Member(target, field) => {
                target.write_operand(f, POSTFIX_PRECEDENCE)?;
                write!(f, ".{}", field)
            }
            Expr::Index(target, index) => {
                target.write_operand(f, POSTFIX_PRECEDENCE)?;
                write!(f, "[{}]", index)
            }
            Expr::Call {
                target,
                function,
                args,
            } => {
                if let Some(target) = target {
                    target.write_operand(f, POSTFIX_PRECEDENCE)?;
                    write!(f, ".")?;
                }
                write!(f, "{}(", function)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Unary(op, operand) => {
                write!(
                    f,
                    "{}",
                    match op {
                        UnaryOp::Not => "!",
                        UnaryOp::Neg => "-",
                    }
                )?;
                operand.write_operand(f, UNARY_PRECEDENCE)
            }
            Expr::Binary(left, op, right) => {
                // Left-associative: the right operand needs parens at equal precedence
                left.write_operand(f, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                right.write_operand(f, op.precedence() + 1)
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.write_operand(f, TERNARY_PRECEDENCE + 1)?;
                write!(f, " ? ")?;
                then.write_operand(f, TERNARY_PRECEDENCE + 1)?;
                write!(f, " : ")?;
                otherwise.write_operand(f, TERNARY_PRECEDENCE)
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expr::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
