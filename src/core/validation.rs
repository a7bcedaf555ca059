//! Validation for policy node names
//!
//! Environment, system and group names compose into externally visible
//! identifiers (`environment.system.group`, directory group addresses), so
//! they are restricted to a conservative character set and length.

use crate::core::error::PolicyError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum length of a node name
pub const NAME_MAX_LENGTH: usize = 24;

/// Maximum length for names of legacy-imported groups, which are derived
/// from role names and tend to be longer
pub const NAME_MAX_LENGTH_EXTENDED: usize = 42;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("name pattern is valid"));

/// Validate a node name against the default length limit
///
/// # Rules
/// - Letters, digits and hyphens only
/// - 1 to `max_length` characters
///
/// # Examples
///
/// ```
/// use jit_policy::validation::validate_name;
///
/// assert!(validate_name("prod-db", 24).is_ok());
/// assert!(validate_name("has.dot", 24).is_err());
/// assert!(validate_name("", 24).is_err());
/// ```
pub fn validate_name(name: &str, max_length: usize) -> Result<(), PolicyError> {
    let invalid = |reason: String| PolicyError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty".to_string()));
    }

    if name.len() > max_length {
        return Err(invalid(format!(
            "name too long (max {} characters)",
            max_length
        )));
    }

    if !NAME_PATTERN.is_match(name) {
        return Err(invalid(
            "name must contain only letters, digits, and hyphens".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("a", NAME_MAX_LENGTH).is_ok());
        assert!(validate_name("Prod-1", NAME_MAX_LENGTH).is_ok());
        assert!(validate_name(&"x".repeat(NAME_MAX_LENGTH), NAME_MAX_LENGTH).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("", NAME_MAX_LENGTH).is_err());
        assert!(validate_name("under_score", NAME_MAX_LENGTH).is_err());
        assert!(validate_name("dot.ted", NAME_MAX_LENGTH).is_err());
        assert!(validate_name("white space", NAME_MAX_LENGTH).is_err());
        assert!(validate_name(&"x".repeat(NAME_MAX_LENGTH + 1), NAME_MAX_LENGTH).is_err());
    }

    #[test]
    fn test_extended_limit() {
        let name = "x".repeat(NAME_MAX_LENGTH_EXTENDED);
        assert!(validate_name(&name, NAME_MAX_LENGTH).is_err());
        assert!(validate_name(&name, NAME_MAX_LENGTH_EXTENDED).is_ok());
    }
}
