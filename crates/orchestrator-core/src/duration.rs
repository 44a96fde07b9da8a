// SPDX-License-Identifier: Apache-2.0

//! Duration grammar: `<number>(ms|s|m|h)`, one optional decimal point.

use crate::error::{OrchestratorError, Result};
use regex::Regex;
use std::sync::OnceLock;

static DURATION_RE: OnceLock<Regex> = OnceLock::new();

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)(ms|s|m|h)$").unwrap())
}

/// Parses a duration string into a millisecond count.
///
/// No defaults are applied here for a missing/unknown unit — callers decide
/// their own default duration (e.g. step `timeout` defaults to 30s at the
/// call site in `config.rs`, not here).
pub fn parse_duration(input: &str) -> Result<u64> {
    let input = input.trim();
    let caps = duration_re()
        .captures(input)
        .ok_or_else(|| OrchestratorError::config(format!("invalid duration: '{input}'")))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| OrchestratorError::config(format!("invalid duration number: '{input}'")))?;

    let millis_per_unit: f64 = match &caps[2] {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        other => return Err(OrchestratorError::config(format!("unknown duration unit: '{other}'"))),
    };

    Ok((number * millis_per_unit).round() as u64)
}

/// Renders a millisecond count back into the shortest grammar form that
/// round-trips through [`parse_duration`]. Used by tests asserting
/// `parse(format(d)) == d`; also handy for logging.
pub fn format_duration(millis: u64) -> String {
    if millis % 3_600_000 == 0 && millis > 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 && millis > 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_units() {
        assert_eq!(parse_duration("5s").unwrap(), 5_000);
        assert_eq!(parse_duration("2m").unwrap(), 120_000);
        assert_eq!(parse_duration("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration("250ms").unwrap(), 250);
    }

    #[test]
    fn parses_decimal() {
        assert_eq!(parse_duration("1.5s").unwrap(), 1_500);
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn round_trips_through_format() {
        for d in [1_000u64, 60_000, 3_600_000, 1_500, 250] {
            let formatted = format_duration(d);
            assert_eq!(parse_duration(&formatted).unwrap(), d);
        }
    }
}
