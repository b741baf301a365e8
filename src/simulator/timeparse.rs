//! Parse human-friendly duration strings (`500ms`, `10s`, `5m`, `1h`).
//!
//! Grounded on `examples/original_source/simulator/core/timeparse.py`.

use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h)$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum DurationParseError {
    #[error("duration {0:?} must match <number><unit> where unit is ms|s|m|h")]
    Malformed(String),
    #[error("duration {0:?} must be non-negative")]
    Negative(String),
}

pub fn parse_duration_to_seconds(raw: &str) -> Result<f64, DurationParseError> {
    let trimmed = raw.trim();
    let caps = DURATION_RE.captures(trimmed).ok_or_else(|| DurationParseError::Malformed(raw.to_string()))?;
    let value: f64 = caps[1].parse().map_err(|_| DurationParseError::Malformed(raw.to_string()))?;
    if value < 0.0 {
        return Err(DurationParseError::Negative(raw.to_string()));
    }
    Ok(match &caps[2] {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration_to_seconds("500ms").unwrap(), 0.5);
        assert_eq!(parse_duration_to_seconds("10s").unwrap(), 10.0);
        assert_eq!(parse_duration_to_seconds("5m").unwrap(), 300.0);
        assert_eq!(parse_duration_to_seconds("1h").unwrap(), 3600.0);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration_to_seconds("nonsense").is_err());
        assert!(parse_duration_to_seconds("10").is_err());
        assert!(parse_duration_to_seconds("-5s").is_err());
    }
}
