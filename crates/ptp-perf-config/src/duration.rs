//! Human-readable durations used in configuration files.
//!
//! Accepted forms are `"500ms"`, `"10s"`, `"1m"` and `"2h"`. Offsets may
//! carry a leading sign (`"-1m"`).

use std::time::Duration;

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Check for "ms" BEFORE "s" since "ms" ends with 's'
    let (number, unit_millis) = if let Some(number) = s.strip_suffix("ms") {
        (number, 1u64)
    } else if let Some(number) = s.strip_suffix('s') {
        (number, 1_000)
    } else if let Some(number) = s.strip_suffix('m') {
        (number, 60_000)
    } else if let Some(number) = s.strip_suffix('h') {
        (number, 3_600_000)
    } else {
        return Err(format!("Duration must end with 'ms', 's', 'm' or 'h': {}", s));
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration out of range: {}", s))
}

/// Parses a duration that may be negative, such as a clock offset.
pub fn parse_signed_duration(s: &str) -> Result<chrono::Duration, String> {
    let s = s.trim();
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = parse_duration(magnitude)?;
    let magnitude = chrono::Duration::from_std(magnitude)
        .map_err(|_| format!("Duration out of range: {}", s))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Formats with the largest unit that represents the value exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        "0s".to_string()
    } else if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{}ms", millis)
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// Signed offsets, stored as Option<chrono::Duration>
pub(crate) mod option_offset_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(offset: &Option<chrono::Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match offset {
            Some(offset) => {
                let magnitude = offset.abs().to_std().map_err(serde::ser::Error::custom)?;
                let sign = if *offset < chrono::Duration::zero() { "-" } else { "" };
                serializer.serialize_str(&format!("{}{}", sign, super::format_duration(magnitude)))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<chrono::Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        match opt {
            Some(s) => super::parse_signed_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("tens").is_err());
        assert!(parse_duration("-1m").is_err());
    }

    #[test]
    fn test_parse_signed_duration() {
        assert_eq!(parse_signed_duration("-1m").unwrap(), chrono::Duration::seconds(-60));
        assert_eq!(parse_signed_duration("+30s").unwrap(), chrono::Duration::seconds(30));
        assert!(parse_signed_duration("secondary-slave").is_err());
    }

    #[test]
    fn test_format_duration_picks_largest_unit() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
    }
}
