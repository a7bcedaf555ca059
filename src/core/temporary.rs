//! Time-bounded grants expressed as conditions over `request.time`
//!
//! A grant that is valid from `start` (inclusive) to `end` (exclusive) is
//! written as:
//!
//! ```text
//! (request.time >= timestamp("2020-01-01T00:00:00Z") && request.time < timestamp("2020-01-01T00:05:00Z"))
//! ```
//!
//! This is the only form the codec produces and the only form it recognizes.

use crate::core::error::TemporaryConditionError;
use crate::core::expression::parse_timestamp;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

static CONDITION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^request\.time\s*>=\s*timestamp\(\s*["']([^"']+)["']\s*\)\s*&&\s*request\.time\s*<\s*timestamp\(\s*["']([^"']+)["']\s*\)$"#,
    )
    .expect("temporary condition pattern is valid")
});

/// Immutable `[start, end)` window with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TemporaryConditionError> {
        if start > end {
            return Err(TemporaryConditionError::InvalidSpan {
                start: format_instant(&start),
                end: format_instant(&end),
            });
        }
        Ok(TimeSpan { start, end })
    }

    /// Span of `duration` starting at `start`; negative durations and
    /// ends past the representable range are rejected
    pub fn starting_at(
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Self, TemporaryConditionError> {
        let end = start
            .checked_add_signed(duration)
            .ok_or_else(|| TemporaryConditionError::InvalidSpan {
                start: format_instant(&start),
                end: format!("{} after start", duration),
            })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `instant` falls within `[start, end)`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Spans order by end instant, then by start instant
impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end
            .cmp(&other.end)
            .then_with(|| self.start.cmp(&other.start))
    }
}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Encoder and recognizer for temporary conditions
pub struct TemporaryCondition;

impl TemporaryCondition {
    /// Encode a validity window as a condition expression
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use jit_policy::temporary::TemporaryCondition;
    ///
    /// let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    /// assert_eq!(
    ///     TemporaryCondition::encode_duration(start, Duration::minutes(5)).unwrap(),
    ///     "(request.time >= timestamp(\"2020-01-01T00:00:00Z\") && \
    ///      request.time < timestamp(\"2020-01-01T00:05:00Z\"))"
    /// );
    /// ```
    pub fn encode(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "(request.time >= timestamp(\"{}\") && request.time < timestamp(\"{}\"))",
            format_instant(&start),
            format_instant(&end)
        )
    }

    pub fn encode_duration(
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<String, TemporaryConditionError> {
        Ok(Self::encode_span(&TimeSpan::starting_at(start, duration)?))
    }

    pub fn encode_span(span: &TimeSpan) -> String {
        Self::encode(span.start, span.end)
    }

    /// Check whether a condition has exactly the temporary-condition shape
    pub fn is_temporary_condition(condition: &str) -> bool {
        Self::captures(condition).is_some()
    }

    /// Extract the validity window from a temporary condition
    pub fn decode(condition: &str) -> Result<TimeSpan, TemporaryConditionError> {
        let not_temporary = || TemporaryConditionError::NotATemporaryCondition(condition.to_string());

        let (start, end) = Self::captures(condition).ok_or_else(not_temporary)?;
        let start = parse_timestamp(&start).map_err(|_| not_temporary())?;
        let end = parse_timestamp(&end).map_err(|_| not_temporary())?;

        TimeSpan::new(start, end)
    }

    /// True iff `condition` is a temporary condition whose window contains `now`
    pub fn evaluate(condition: &str, now: DateTime<Utc>) -> bool {
        Self::decode(condition)
            .map(|span| span.contains(now))
            .unwrap_or(false)
    }

    fn captures(condition: &str) -> Option<(String, String)> {
        let mut text = condition.trim();

        // Peel redundant wrapping parentheses
        while text.starts_with('(') && text.ends_with(')') {
            text = text[1..text.len() - 1].trim();
        }

        CONDITION_PATTERN
            .captures(text)
            .map(|c| (c[1].to_string(), c[2].to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_encode() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            TemporaryCondition::encode_duration(start, Duration::minutes(5)).unwrap(),
            "(request.time >= timestamp(\"2020-01-01T00:00:00Z\") && request.time < timestamp(\"2020-01-01T00:05:00Z\"))"
        );
    }

    #[test]
    fn test_decode_roundtrip_with_subseconds() {
        let start = instant("2021-03-04T05:06:07.123Z");
        let end = instant("2021-03-04T06:06:07.123Z");
        let span = TemporaryCondition::decode(&TemporaryCondition::encode(start, end)).unwrap();
        assert_eq!(span.start(), start);
        assert_eq!(span.end(), end);
    }

    #[test]
    fn test_is_temporary_condition() {
        let encoded = TemporaryCondition::encode(
            instant("2020-01-01T00:00:00Z"),
            instant("2020-01-01T01:00:00Z"),
        );
        assert!(TemporaryCondition::is_temporary_condition(&encoded));
        assert!(TemporaryCondition::is_temporary_condition(&format!("(({}))", encoded)));
        assert!(TemporaryCondition::is_temporary_condition(
            "request.time >= timestamp(\"2020-01-01T00:00:00Z\")&&request.time<timestamp(\"2020-01-01T01:00:00Z\")"
        ));

        assert!(!TemporaryCondition::is_temporary_condition(&format!(
            "{} && resource.name == \"x\"",
            encoded
        )));
        assert!(!TemporaryCondition::is_temporary_condition("true"));
        assert!(!TemporaryCondition::is_temporary_condition(""));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            TemporaryCondition::decode("resource.name == 'x'"),
            Err(TemporaryConditionError::NotATemporaryCondition(_))
        ));
        assert!(matches!(
            TemporaryCondition::decode(
                "request.time >= timestamp(\"garbage\") && request.time < timestamp(\"2020-01-01T00:00:00Z\")"
            ),
            Err(TemporaryConditionError::NotATemporaryCondition(_))
        ));
    }

    #[test]
    fn test_evaluate() {
        let start = instant("2020-01-01T00:00:00Z");
        let end = instant("2020-01-01T01:00:00Z");
        let condition = TemporaryCondition::encode(start, end);

        assert!(TemporaryCondition::evaluate(&condition, start));
        assert!(TemporaryCondition::evaluate(&condition, start + Duration::minutes(30)));
        assert!(!TemporaryCondition::evaluate(&condition, end));
        assert!(!TemporaryCondition::evaluate(&condition, start - Duration::seconds(1)));
        assert!(!TemporaryCondition::evaluate("true", start));
    }

    #[test]
    fn test_time_span_invariants() {
        let a = instant("2020-01-01T00:00:00Z");
        let b = instant("2020-01-01T01:00:00Z");

        assert!(TimeSpan::new(b, a).is_err());
        assert!(TimeSpan::starting_at(a, Duration::minutes(-1)).is_err());
        assert!(matches!(
            TimeSpan::starting_at(a, Duration::days(100_000_000)),
            Err(TemporaryConditionError::InvalidSpan { .. })
        ));
        assert!(TemporaryCondition::encode_duration(a, Duration::days(100_000_000)).is_err());

        let span = TimeSpan::new(a, b).unwrap();
        assert_eq!(span.duration(), Duration::hours(1));
        assert!(span.contains(a));
        assert!(!span.contains(b));
    }

    #[test]
    fn test_time_span_orders_by_end() {
        let t0 = instant("2020-01-01T00:00:00Z");
        let long_early = TimeSpan::new(t0, t0 + Duration::hours(3)).unwrap();
        let short_late = TimeSpan::new(t0 + Duration::hours(1), t0 + Duration::hours(2)).unwrap();
        let same_end = TimeSpan::new(t0 + Duration::minutes(30), t0 + Duration::hours(3)).unwrap();

        let mut spans = vec![long_early, short_late, same_end];
        spans.sort();
        assert_eq!(spans, vec![short_late, long_early, same_end]);
    }
}
