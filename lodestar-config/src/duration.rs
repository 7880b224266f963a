// Duration parsing for configuration values

use crate::{ConfigError, Result};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::time::Duration;

/// Parse `500ms`, `5s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    if digits.is_empty() {
        return Err(ConfigError::ParseError(format!("Invalid duration: {:?}", input)));
    }

    let amount: u64 = digits
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("Invalid duration: {:?}", input)))?;

    let multiplier = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => {
            return Err(ConfigError::ParseError(format!(
                "Unknown duration unit {:?} in {:?}",
                other, input
            )));
        }
    };

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::ParseError(format!("Duration out of range: {:?}", input)))
}

/// Render a duration in the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{}ms", duration.as_millis());
    }

    match duration.as_secs() {
        0 => "0s".to_string(),
        secs if secs % 3600 == 0 => format!("{}h", secs / 3600),
        secs if secs % 60 == 0 => format!("{}m", secs / 60),
        secs => format!("{}s", secs),
    }
}

/// Serde adapter for durations written as strings or seconds.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct Timing {
///     #[serde(with = "lodestar_config::duration::serde_duration")]
///     retry_period: Duration,
/// }
/// ```
pub mod serde_duration {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration such as \"5s\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Duration, E> {
        parse_duration(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| E::custom(format!("negative duration: {}", value)))
    }
}
