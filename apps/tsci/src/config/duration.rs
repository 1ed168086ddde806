//! Human-readable duration parsing for timeouts.
//!
//! Accepts `<integer><unit>` with unit one of `ms`, `s`, `m`, `h`
//! (case-insensitive, surrounding whitespace ignored). Anything else falls
//! back to [`DEFAULT_TIMEOUT_MS`]; parsing never fails.

use std::time::Duration;

/// Fallback used for empty or malformed duration strings (2 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Parses a duration string into milliseconds.
///
/// ```ignore
/// assert_eq!(parse_millis("90s"), 90_000);
/// assert_eq!(parse_millis("soon"), DEFAULT_TIMEOUT_MS);
/// ```
#[must_use]
pub fn parse_millis(input: &str) -> u64 {
    try_parse_millis(input).unwrap_or(DEFAULT_TIMEOUT_MS)
}

/// Parses a duration string into a [`Duration`], with the same fallback.
#[must_use]
pub fn parse_duration(input: &str) -> Duration {
    Duration::from_millis(parse_millis(input))
}

/// Parses a duration string, returning `fallback` for malformed input.
#[must_use]
pub fn parse_duration_or(input: &str, fallback: Duration) -> Duration {
    try_parse_millis(input).map_or(fallback, Duration::from_millis)
}

fn try_parse_millis(input: &str) -> Option<u64> {
    let input = input.trim().to_ascii_lowercase();
    let digits_end = input
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(input.len(), |(i, _)| i);
    let (number, unit) = input.split_at(digits_end);
    if number.is_empty() {
        return None;
    }

    let scale = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return None,
    };

    number.parse::<u64>().ok()?.checked_mul(scale)
}
