use std::time::Duration;

use crate::error::WatchdogError;

/// Parse a human duration such as `"90"`, `"90s"`, `"15m"`, `"6h"`, `"1d"`
/// or `"250ms"`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, WatchdogError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    if digits.is_empty() {
        return Err(WatchdogError::InvalidDuration(format!(
            "'{}' does not start with a number",
            s
        )));
    }

    let value: u64 = digits
        .parse()
        .map_err(|e| WatchdogError::InvalidDuration(format!("'{}': {}", s, e)))?;

    let secs_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => {
            return Err(WatchdogError::InvalidDuration(format!(
                "'{}': unknown unit '{}' (use ms, s, m, h or d)",
                s, other
            )));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| WatchdogError::InvalidDuration(format!("'{}' is too large", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("6h").unwrap(), Duration::from_secs(6 * 3600));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 5 m ").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("99999999999999999999d").is_err());
    }
}
