//! Settings for importing legacy role bindings

use crate::core::constraint::{
    iso_duration, Constraint, ExpiryConstraint, ExpressionConstraint, VariableSpec,
};
use crate::core::error::{ImportError, Result};
use crate::core::validation::{validate_name, NAME_MAX_LENGTH_EXTENDED};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shortest activation a legacy group allows
pub const MIN_ACTIVATION_MINUTES: i64 = 1;

const JUSTIFICATION_MAX_LENGTH: usize = 256;

fn default_environment_name() -> String {
    "classic".to_string()
}

fn default_activation_timeout() -> Duration {
    Duration::hours(2)
}

fn default_justification_pattern() -> String {
    ".*".to_string()
}

fn default_justification_hint() -> String {
    "Bug or case number".to_string()
}

fn default_min_reviewers() -> u32 {
    1
}

fn default_approval_timeout() -> Duration {
    Duration::hours(1)
}

/// Settings for importing legacy role bindings
///
/// # Example TOML
///
/// ```toml
/// environment_name = "classic"
/// activation_timeout = "PT4H"
/// justification_pattern = "^(b/[0-9]+|INC-[0-9]+)$"
/// justification_hint = "Bug or incident number"
/// min_reviewers = 1
/// approval_timeout = "PT1H"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPolicyConfig {
    #[serde(default = "default_environment_name")]
    pub environment_name: String,

    /// Longest activation; the shortest is fixed at one minute
    #[serde(default = "default_activation_timeout", with = "iso_duration")]
    pub activation_timeout: Duration,

    /// Regular expression justifications must match
    #[serde(default = "default_justification_pattern")]
    pub justification_pattern: String,

    #[serde(default = "default_justification_hint")]
    pub justification_hint: String,

    /// Distinct reviewers a peer-approved activation needs
    #[serde(default = "default_min_reviewers")]
    pub min_reviewers: u32,

    #[serde(default = "default_approval_timeout", with = "iso_duration")]
    pub approval_timeout: Duration,
}

impl Default for LegacyPolicyConfig {
    fn default() -> Self {
        LegacyPolicyConfig {
            environment_name: default_environment_name(),
            activation_timeout: default_activation_timeout(),
            justification_pattern: default_justification_pattern(),
            justification_hint: default_justification_hint(),
            min_reviewers: default_min_reviewers(),
            approval_timeout: default_approval_timeout(),
        }
    }
}

impl LegacyPolicyConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: LegacyPolicyConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ImportError> {
        validate_name(&self.environment_name, NAME_MAX_LENGTH_EXTENDED)
            .map_err(|e| ImportError::Config(e.to_string()))?;

        if self.activation_timeout < Duration::minutes(MIN_ACTIVATION_MINUTES) {
            return Err(ImportError::Config(format!(
                "activation_timeout must be at least {} minute",
                MIN_ACTIVATION_MINUTES
            )));
        }

        regex::Regex::new(&self.justification_pattern).map_err(|e| {
            ImportError::Config(format!("invalid justification_pattern: {}", e))
        })?;

        if self.min_reviewers == 0 {
            return Err(ImportError::Config(
                "min_reviewers must be at least 1".to_string(),
            ));
        }

        if self.approval_timeout <= Duration::zero() {
            return Err(ImportError::Config(
                "approval_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Constraints every imported group applies at join time: an expiry
    /// within `[1 minute, activation_timeout]` and a justification
    pub fn join_constraints(&self) -> std::result::Result<Vec<Arc<dyn Constraint>>, ImportError> {
        let invalid = |e: crate::core::error::ConstraintError| ImportError::Config(e.to_string());

        let expiry = ExpiryConstraint::new(
            Duration::minutes(MIN_ACTIVATION_MINUTES),
            self.activation_timeout,
        )
        .map_err(invalid)?;

        let pattern = self
            .justification_pattern
            .replace('\\', "\\\\")
            .replace('\'', "\\'");
        let justification = ExpressionConstraint::new(
            "justification",
            self.justification_hint.clone(),
            vec![VariableSpec::string(
                "justification",
                self.justification_hint.clone(),
                1,
                JUSTIFICATION_MAX_LENGTH,
            )],
            &format!("input.justification.matches('{}')", pattern),
        )
        .map_err(invalid)?;

        Ok(vec![Arc::new(expiry), Arc::new(justification)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::JitError;

    #[test]
    fn test_defaults() {
        let config = LegacyPolicyConfig::from_toml("").unwrap();
        assert_eq!(config, LegacyPolicyConfig::default());
        assert_eq!(config.environment_name, "classic");
        assert_eq!(config.activation_timeout, Duration::hours(2));
        assert_eq!(config.min_reviewers, 1);
    }

    #[test]
    fn test_from_toml() {
        let config = LegacyPolicyConfig::from_toml(
            r#"
            environment_name = "legacy"
            activation_timeout = "PT4H"
            justification_pattern = '^b/\d+$'
            min_reviewers = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.activation_timeout, Duration::hours(4));
        assert_eq!(config.justification_pattern, r"^b/\d+$");
        assert_eq!(config.approval_timeout, Duration::hours(1));
    }

    #[test]
    fn test_invalid_configs() {
        for text in [
            "activation_timeout = \"PT30S\"",
            "justification_pattern = \"(\"",
            "min_reviewers = 0",
            "environment_name = \"not valid\"",
            "approval_timeout = \"PT0S\"",
        ] {
            assert!(
                matches!(
                    LegacyPolicyConfig::from_toml(text),
                    Err(JitError::Import(ImportError::Config(_)))
                ),
                "{}",
                text
            );
        }
        assert!(matches!(
            LegacyPolicyConfig::from_toml("activation_timeout = \"2 hours\""),
            Err(JitError::Config(_))
        ));
    }

    #[test]
    fn test_join_constraints_use_pattern() {
        let config = LegacyPolicyConfig {
            justification_pattern: r"^b/\d+$".to_string(),
            ..LegacyPolicyConfig::default()
        };
        let constraints = config.join_constraints().unwrap();
        assert_eq!(constraints.len(), 2);

        let expiry = constraints[0].as_expiry().unwrap();
        assert_eq!(expiry.min(), Duration::minutes(1));
        assert_eq!(expiry.max(), Duration::hours(2));

        let mut check = constraints[1].create_check();
        check.set_input("justification", "b/42").unwrap();
        assert!(check.evaluate().unwrap());

        let mut check = constraints[1].create_check();
        check.set_input("justification", "b/x").unwrap();
        assert!(!check.evaluate().unwrap());
    }

    #[test]
    fn test_quotes_in_pattern() {
        let config = LegacyPolicyConfig {
            justification_pattern: "^it's .+$".to_string(),
            ..LegacyPolicyConfig::default()
        };
        let constraints = config.join_constraints().unwrap();
        let mut check = constraints[1].create_check();
        check.set_input("justification", "it's urgent").unwrap();
        assert!(check.evaluate().unwrap());
    }
}
