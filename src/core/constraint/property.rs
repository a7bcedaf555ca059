//! Typed user inputs declared by constraint checks

use crate::core::error::ConstraintError;
use crate::core::expression::Value;
use chrono::Duration;
use std::fmt;

/// Type and bounds of a property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Long {
        min: Option<i64>,
        max: Option<i64>,
    },
    Bool,
    Duration {
        min: Option<Duration>,
        max: Option<Duration>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Long(i64),
    Bool(bool),
    Duration(Duration),
}

impl From<&PropertyValue> for Value {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Long(i) => Value::Int(*i),
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Duration(d) => Value::Duration(*d),
        }
    }
}

/// A named input a user supplies to satisfy a constraint
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    display_name: String,
    property_type: PropertyType,
    required: bool,
    value: Option<PropertyValue>,
}

impl Property {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        property_type: PropertyType,
        required: bool,
    ) -> Self {
        Property {
            name: name.into(),
            display_name: display_name.into(),
            property_type,
            required,
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Set a value of the property's type; bounds are checked by the
    /// owning check when it evaluates
    pub fn set(&mut self, value: PropertyValue) -> Result<(), ConstraintError> {
        let type_matches = matches!(
            (&self.property_type, &value),
            (PropertyType::String { .. }, PropertyValue::String(_))
                | (PropertyType::Long { .. }, PropertyValue::Long(_))
                | (PropertyType::Bool, PropertyValue::Bool(_))
                | (PropertyType::Duration { .. }, PropertyValue::Duration(_))
        );
        if !type_matches {
            return Err(self.invalid(format!("{:?} does not match {:?}", value, self.property_type)));
        }

        self.value = Some(value);
        Ok(())
    }

    /// Parse user-supplied text according to the property's type
    ///
    /// Durations accept whole minutes (`90`) or ISO-8601 (`PT1H30M`).
    pub fn set_text(&mut self, text: &str) -> Result<(), ConstraintError> {
        let text = text.trim();
        let value = match &self.property_type {
            PropertyType::String { .. } => PropertyValue::String(text.to_string()),
            PropertyType::Long { .. } => PropertyValue::Long(
                text.parse()
                    .map_err(|_| self.invalid(format!("'{}' is not a number", text)))?,
            ),
            PropertyType::Bool => PropertyValue::Bool(match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => return Err(self.invalid(format!("'{}' is not a boolean", text))),
            }),
            PropertyType::Duration { .. } => {
                let duration = match text.parse::<i64>() {
                    Ok(minutes) => Duration::try_minutes(minutes),
                    Err(_) => parse_iso_duration(text),
                }
                .ok_or_else(|| self.invalid(format!("'{}' is not a duration", text)))?;
                PropertyValue::Duration(duration)
            }
        };
        self.set(value)
    }

    /// Whether the current value lies within the declared bounds
    ///
    /// Returns `false` when no value is set.
    pub fn is_within_bounds(&self) -> bool {
        match (&self.property_type, &self.value) {
            (
                PropertyType::String {
                    min_length,
                    max_length,
                },
                Some(PropertyValue::String(s)),
            ) => {
                let len = s.chars().count();
                min_length.map_or(true, |min| len >= min) && max_length.map_or(true, |max| len <= max)
            }
            (PropertyType::Long { min, max }, Some(PropertyValue::Long(i))) => {
                min.map_or(true, |min| *i >= min) && max.map_or(true, |max| *i <= max)
            }
            (PropertyType::Bool, Some(PropertyValue::Bool(_))) => true,
            (PropertyType::Duration { min, max }, Some(PropertyValue::Duration(d))) => {
                min.map_or(true, |min| *d >= min) && max.map_or(true, |max| *d <= max)
            }
            _ => false,
        }
    }

    fn invalid(&self, message: String) -> ConstraintError {
        ConstraintError::InvalidInput {
            property: self.name.clone(),
            message,
        }
    }
}

/// Parse an ISO-8601 duration such as `PT1H30M`, `P1DT2H` or `PT0.5S`
pub fn parse_iso_duration(text: &str) -> Option<Duration> {
    let rest = text.trim().strip_prefix('P').or_else(|| text.trim().strip_prefix('p'))?;
    if rest.is_empty() {
        return None;
    }

    let mut total_millis: f64 = 0.0;
    let mut in_time = false;
    let mut number = String::new();
    let mut seen_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' if !in_time && number.is_empty() => in_time = true,
            d if d.is_ascii_digit() || d == '.' => number.push(d),
            unit => {
                let value: f64 = number.parse().ok()?;
                number.clear();
                let millis_per_unit = match (in_time, unit) {
                    (false, 'W') => 7.0 * 86_400_000.0,
                    (false, 'D') => 86_400_000.0,
                    (true, 'H') => 3_600_000.0,
                    (true, 'M') => 60_000.0,
                    (true, 'S') => 1_000.0,
                    _ => return None,
                };
                total_millis += value * millis_per_unit;
                seen_component = true;
            }
        }
    }

    if !number.is_empty() || !seen_component || total_millis > i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(total_millis.round() as i64)
}

/// Format a duration as ISO-8601, e.g. `PT1H30M`
pub fn format_iso_duration(duration: &Duration) -> String {
    let total = duration.num_seconds();
    if total == 0 {
        return "PT0S".to_string();
    }

    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::from("PT");
    if hours != 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes != 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds != 0 {
        out.push_str(&format!("{}S", seconds));
    }
    out
}

/// Human-readable duration such as `2 hours` or `1 hour 30 minutes`
pub struct HumanDuration<'a>(pub &'a Duration);

impl fmt::Display for HumanDuration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds();
        let parts = [
            (total / 86_400, "day"),
            ((total % 86_400) / 3600, "hour"),
            ((total % 3600) / 60, "minute"),
            (total % 60, "second"),
        ];

        let mut written = false;
        for (count, unit) in parts.iter().filter(|(count, _)| *count != 0) {
            if written {
                write!(f, " ")?;
            }
            write!(f, "{} {}{}", count, unit, if *count == 1 { "" } else { "s" })?;
            written = true;
        }
        if !written {
            write!(f, "0 seconds")?;
        }
        Ok(())
    }
}
