//! Tokenizer for the expression language

use crate::core::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Double(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
}

/// Token plus its character offset in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c.is_ascii_digit() {
            let (token, next) = lex_number(&chars, i)?;
            tokens.push(Spanned {
                token,
                position: start,
            });
            i = next;
            continue;
        }

        if c == '\'' || c == '"' {
            let (value, next) = lex_string(&chars, i)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                position: start,
            });
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "in" => Token::In,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned {
                token,
                position: start,
            });
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Not, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('?', _) => (Token::Question, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => {
                return Err(ExpressionError::parse(
                    start,
                    format!("unexpected character '{}'", c),
                ))
            }
        };
        tokens.push(Spanned {
            token,
            position: start,
        });
        i += width;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), ExpressionError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }

    let mut is_double = false;
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        is_double = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    if i < chars.len() && matches!(chars[i], 'e' | 'E') {
        let mut j = i + 1;
        if j < chars.len() && matches!(chars[j], '+' | '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_double = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    let token = if is_double {
        let value: f64 = text
            .parse()
            .map_err(|_| ExpressionError::parse(start, format!("invalid number '{}'", text)))?;
        if !value.is_finite() {
            return Err(ExpressionError::parse(start, format!("number '{}' out of range", text)));
        }
        Token::Double(value)
    } else {
        Token::Int(
            text.parse()
                .map_err(|_| ExpressionError::parse(start, format!("integer '{}' out of range", text)))?,
        )
    };

    Ok((token, i))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((value, i + 1));
        }
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .ok_or_else(|| ExpressionError::parse(i, "unterminated escape sequence"))?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                other => {
                    return Err(ExpressionError::parse(
                        i,
                        format!("invalid escape sequence '\\{}'", other),
                    ))
                }
            });
            i += 2;
            continue;
        }
        if c == '\n' {
            break;
        }
        value.push(c);
        i += 1;
    }

    Err(ExpressionError::parse(start, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a&&b||!c"),
            vec![
                Token::Ident("a".into()),
                Token::AndAnd,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Not,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_exponent_literals() {
        assert_eq!(
            kinds("1e16 2.5E-3 7e+2"),
            vec![Token::Double(1e16), Token::Double(2.5e-3), Token::Double(700.0)]
        );
        assert_eq!(
            kinds("1e"),
            vec![Token::Int(1), Token::Ident("e".into())]
        );
        assert!(tokenize("1e999").is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds("1 2.5 'x' \"y\" true null in"),
            vec![
                Token::Int(1),
                Token::Double(2.5),
                Token::Str("x".into()),
                Token::Str("y".into()),
                Token::True,
                Token::Null,
                Token::In,
            ]
        );
    }

    #[test]
    fn test_escapes_and_comments() {
        assert_eq!(
            kinds("'it\\'s' // trailing comment\n x"),
            vec![Token::Str("it's".into()), Token::Ident("x".into())]
        );
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("99999999999999999999").is_err());
    }
}
