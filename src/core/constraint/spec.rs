//! Serializable constraint descriptions, as found in policy documents

use super::{Constraint, ExpiryConstraint, ExpressionConstraint, Property, PropertyType};
use crate::core::error::ConstraintError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serde adapter for ISO-8601 durations (`PT1H30M`)
pub(crate) mod iso_duration {
    use super::super::{format_iso_duration, parse_iso_duration};
    use chrono::Duration;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_iso_duration(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_iso_duration(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 duration '{}'", text)))
    }

    /// Same, for optional fields
    pub mod option {
        use super::super::super::{format_iso_duration, parse_iso_duration};
        use chrono::Duration;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => serializer.serialize_some(&format_iso_duration(d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| {
                    parse_iso_duration(&text).ok_or_else(|| {
                        de::Error::custom(format!("invalid ISO-8601 duration '{}'", text))
                    })
                })
                .transpose()
        }
    }
}

/// A constraint as written in a policy document
///
/// ```json
/// {"type": "expiry", "min": "PT5M", "max": "PT2H"}
/// {"type": "expression", "name": "ticket", "displayName": "Ticket number",
///  "expression": "input.ticket.matches('^[A-Z]+-[0-9]+$')",
///  "variables": [{"name": "ticket", "type": "string", "max": 32}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConstraintSpec {
    Expiry {
        #[serde(with = "iso_duration")]
        min: Duration,
        #[serde(with = "iso_duration")]
        max: Duration,
    },
    Expression {
        name: String,
        #[serde(rename = "displayName")]
        display_name: String,
        expression: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        variables: Vec<VariableSpec>,
    },
}

impl ConstraintSpec {
    pub fn name(&self) -> &str {
        match self {
            ConstraintSpec::Expiry { .. } => ExpiryConstraint::NAME,
            ConstraintSpec::Expression { name, .. } => name,
        }
    }

    /// Validate and instantiate the constraint
    pub fn build(&self) -> Result<Arc<dyn Constraint>, ConstraintError> {
        Ok(match self {
            ConstraintSpec::Expiry { min, max } => Arc::new(ExpiryConstraint::new(*min, *max)?),
            ConstraintSpec::Expression {
                name,
                display_name,
                expression,
                variables,
            } => Arc::new(ExpressionConstraint::new(
                name.clone(),
                display_name.clone(),
                variables.clone(),
                expression,
            )?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    String,
    Int,
    Boolean,
}

fn default_required() -> bool {
    true
}

/// An input variable of an expression constraint
///
/// For strings `min`/`max` bound the length, for ints the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl VariableSpec {
    pub fn string(name: impl Into<String>, display_name: impl Into<String>, min: usize, max: usize) -> Self {
        VariableSpec {
            name: name.into(),
            kind: VariableKind::String,
            display_name: Some(display_name.into()),
            min: Some(min as i64),
            max: Some(max as i64),
            required: true,
        }
    }

    pub fn int(name: impl Into<String>, display_name: impl Into<String>, min: i64, max: i64) -> Self {
        VariableSpec {
            name: name.into(),
            kind: VariableKind::Int,
            display_name: Some(display_name.into()),
            min: Some(min),
            max: Some(max),
            required: true,
        }
    }

    pub fn boolean(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        VariableSpec {
            name: name.into(),
            kind: VariableKind::Boolean,
            display_name: Some(display_name.into()),
            min: None,
            max: None,
            required: true,
        }
    }

    /// Fresh, unset property for a check
    pub fn to_property(&self) -> Property {
        let length = |bound: Option<i64>| bound.map(|b| b.max(0) as usize);
        let property_type = match self.kind {
            VariableKind::String => PropertyType::String {
                min_length: length(self.min),
                max_length: length(self.max),
            },
            VariableKind::Int => PropertyType::Long {
                min: self.min,
                max: self.max,
            },
            VariableKind::Boolean => PropertyType::Bool,
        };
        let display_name = self.display_name.clone().unwrap_or_else(|| self.name.clone());
        Property::new(self.name.clone(), display_name, property_type, self.required)
    }
}
