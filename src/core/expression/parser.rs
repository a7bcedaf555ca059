//! Recursive descent parser producing [`Expr`] trees

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};
use crate::core::error::ExpressionError;

/// Maximum nesting depth before parsing is rejected
const MAX_DEPTH: usize = 64;

/// Maximum number of binary operators and selectors in one expression
const MAX_LINKS: usize = 512;

pub(crate) fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        links: 0,
        end: source.chars().count(),
    };

    let expr = parser.expression()?;
    if let Some(extra) = parser.peek() {
        return Err(ExpressionError::parse(
            extra.position,
            format!("unexpected token {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    links: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|t| &t.token)
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ExpressionError::parse(
                self.position(),
                format!("expected {:?}", expected),
            ))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::parse(
                self.position(),
                "expression nested too deeply",
            ));
        }
        Ok(())
    }

    /// Account for one more node chained onto a left operand
    fn link(&mut self) -> Result<(), ExpressionError> {
        self.links += 1;
        if self.links > MAX_LINKS {
            return Err(ExpressionError::parse(
                self.position(),
                "expression has too many operators",
            ));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let cond = self.or()?;
        let result = if self.eat(&Token::Question) {
            let then = self.or()?;
            self.expect(Token::Colon)?;
            let otherwise = self.expression()?;
            Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))
        } else {
            cond
        };
        self.depth -= 1;
        Ok(result)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            self.link()?;
            let right = self.and()?;
            left = Expr::Binary(Box::new(left), BinaryOp::Or, Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.relation()?;
        while self.eat(&Token::AndAnd) {
            self.link()?;
            let right = self.relation()?;
            left = Expr::Binary(Box::new(left), BinaryOp::And, Box::new(right));
        }
        Ok(left)
    }

    fn relation(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::In) => BinaryOp::In,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.link()?;
            let right = self.additive()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.link()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.link()?;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek_token() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                self.link()?;
                let position = self.position();
                let field = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(ExpressionError::parse(position, "expected field name")),
                };
                if self.eat(&Token::LParen) {
                    let args = self.arguments(Token::RParen)?;
                    expr = Expr::Call {
                        target: Some(Box::new(expr)),
                        function: field,
                        args,
                    };
                } else {
                    expr = Expr::Member(Box::new(expr), field);
                }
            } else if self.eat(&Token::LBracket) {
                self.link()?;
                let index = self.expression()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        let token = self
            .advance()
            .ok_or_else(|| ExpressionError::parse(position, "unexpected end of expression"))?;

        match token {
            Token::Int(i) => Ok(Expr::Literal(Literal::Int(i))),
            Token::Double(d) => Ok(Expr::Literal(Literal::Double(d))),
            Token::Str(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments(Token::RParen)?;
                    if name == "has" && !matches!(args.as_slice(), [Expr::Member(..)]) {
                        return Err(ExpressionError::parse(
                            position,
                            "has() requires a single field selection argument",
                        ));
                    }
                    Ok(Expr::Call {
                        target: None,
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.arguments(Token::RBracket)?)),
            Token::LBrace => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(Token::Colon)?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Ok(Expr::Map(entries))
            }
            other => Err(ExpressionError::parse(
                position,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    /// Comma-separated expressions up to and including `close`
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&close) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }
}
