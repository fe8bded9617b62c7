//! Human duration strings such as `1d` or `2h`.
//!
//! Months are a fixed 30 days; there is no calendar arithmetic.

use crate::error::{Error, Result};
use chrono::TimeDelta;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
const MONTH_MS: i64 = 30 * DAY_MS;

const PARSE_UNITS: [(&str, i64); 6] = [
    ("s", SECOND_MS),
    ("m", MINUTE_MS),
    ("h", HOUR_MS),
    ("d", DAY_MS),
    ("w", WEEK_MS),
    ("mo", MONTH_MS),
];

const FORMAT_UNITS: [(&str, i64); 6] = [
    ("month(s)", MONTH_MS),
    ("week(s)", WEEK_MS),
    ("day(s)", DAY_MS),
    ("hour(s)", HOUR_MS),
    ("minute(s)", MINUTE_MS),
    ("second(s)", SECOND_MS),
];

/// Parses `<integer><unit>` where unit is one of `s`, `m`, `h`, `d`, `w`, `mo`.
///
/// Zero durations are rejected, as is any value that overflows the
/// millisecond range.
pub fn parse(text: &str) -> Result<TimeDelta> {
    let split = text
        .find(|ch: char| !ch.is_ascii_digit())
        .ok_or_else(|| invalid(text))?;
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(invalid(text));
    }

    let multiplier = PARSE_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, ms)| *ms)
        .ok_or_else(|| invalid(text))?;

    let value: i64 = digits.parse().map_err(|_| invalid(text))?;
    if value == 0 {
        return Err(Error::InvalidFormat(format!(
            "duration must be positive: {text}"
        )));
    }

    value
        .checked_mul(multiplier)
        .and_then(TimeDelta::try_milliseconds)
        .ok_or_else(|| Error::InvalidFormat(format!("duration out of range: {text}")))
}

/// Renders a duration in its largest whole unit, e.g. `90s` as `1 minute(s)`.
pub fn format(duration: TimeDelta) -> String {
    let ms = duration.num_milliseconds();
    FORMAT_UNITS
        .iter()
        .find(|(_, unit_ms)| ms >= *unit_ms)
        .map(|(name, unit_ms)| format!("{} {name}", ms / unit_ms))
        .unwrap_or_else(|| "0 second(s)".to_string())
}

fn invalid(text: &str) -> Error {
    Error::InvalidFormat(format!(
        "expected <number><s|m|h|d|w|mo>, got {text:?}"
    ))
}
