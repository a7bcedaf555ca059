//! Top-level conjunction splitting
//!
//! This is a character scanner, not a parser: it only needs to know about
//! brackets, quotes and line comments to find the `&&` operators that sit
//! at the outermost level of an expression. Clause text is returned as-is
//! so callers can match marker clauses textually.

/// Remove `//` line comments, leaving string literals intact
pub fn strip_comments(expression: &str) -> String {
    let mut result = String::with_capacity(expression.len());
    let mut chars = expression.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                result.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Skip to end of line, keep the newline itself
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => result.push(c),
        }
    }

    result
}

/// Split an expression into its top-level `&&` clauses
///
/// `&&` inside parentheses, brackets, braces or string literals does not
/// split. An expression without a top-level `&&` yields a single, trimmed
/// clause.
///
/// # Examples
///
/// ```
/// use jit_policy::expression::split_and;
///
/// assert_eq!(
///     split_and("a || b && c&&(d&&e) "),
///     vec!["a || b ", " c", "(d&&e) "]
/// );
/// assert_eq!(split_and("  single  "), vec!["single"]);
/// ```
pub fn split_and(expression: &str) -> Vec<String> {
    let text = strip_comments(expression);
    let bytes = text.as_bytes();

    let mut clauses = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut start = 0;
    let mut i = 0;

    // All delimiters are ASCII, so byte offsets are valid char boundaries
    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'&' if depth == 0 && bytes.get(i + 1) == Some(&b'&') => {
                clauses.push(text[start..i].to_string());
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    if clauses.is_empty() {
        return vec![text.trim().to_string()];
    }

    clauses.push(text[start..].to_string());
    clauses
}
