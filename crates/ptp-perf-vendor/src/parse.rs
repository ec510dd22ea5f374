//! Shared extraction of samples from daemon output.

use ptp_perf_common::{EndpointId, Error, Result, SampleType};
use ptp_perf_store::{LogRecord, Sample};
use regex::Regex;
use tracing::warn;

/// Converts a captured number into nanoseconds.
pub(crate) type Scale = fn(&str) -> Option<i64>;

/// Integers in nanoseconds. Falls back to rounding a decimal value.
pub(crate) fn nanos(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|value| value.round() as i64))
}

/// Decimal seconds, possibly in scientific notation.
pub(crate) fn seconds(text: &str) -> Option<i64> {
    text.parse::<f64>()
        .ok()
        .map(ptp_perf_common::seconds_to_nanos)
}

/// Matches `pattern` against every record and emits one clock-diff and one
/// path-delay sample per match, stamped with the record's time.
///
/// The pattern must have the named groups `offset` and `pd`.
pub(crate) fn extract_with_pattern(
    endpoint_id: EndpointId,
    records: &[LogRecord],
    pattern: &str,
    scale: Scale,
) -> Result<Vec<Sample>> {
    let regex = Regex::new(pattern).map_err(|e| Error::validation(e.to_string()))?;
    let mut samples = Vec::new();

    for record in records {
        let Some(captures) = regex.captures(&record.message) else {
            continue;
        };
        let offset = captures.name("offset").and_then(|m| scale(m.as_str()));
        let path_delay = captures.name("pd").and_then(|m| scale(m.as_str()));
        match (offset, path_delay) {
            (Some(offset), Some(path_delay)) => {
                samples.push(sample(endpoint_id, record, SampleType::ClockDiff, offset));
                samples.push(sample(endpoint_id, record, SampleType::PathDelay, path_delay));
            }
            _ => warn!(record_id = record.id, "Skipping unparsable measurement: {}", record.message),
        }
    }
    Ok(samples)
}

fn sample(endpoint_id: EndpointId, record: &LogRecord, sample_type: SampleType, value: i64) -> Sample {
    Sample {
        endpoint_id,
        timestamp: record.timestamp,
        sample_type,
        value,
    }
}

/// Strips the prefix process output is logged with.
pub(crate) fn output_line(message: &str) -> &str {
    message.strip_prefix("| ").unwrap_or(message)
}

#[cfg(test)]
pub(crate) fn record(id: i64, source: &str, message: &str) -> LogRecord {
    use chrono::DateTime;
    LogRecord {
        id,
        endpoint_id: 1,
        timestamp: DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap_or_default(),
        source: source.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales() {
        assert_eq!(nanos("-42"), Some(-42));
        assert_eq!(nanos("+7"), Some(7));
        assert_eq!(nanos("12.6"), Some(13));
        assert_eq!(nanos("abc"), None);
        assert_eq!(seconds("1.5e-06"), Some(1500));
        assert_eq!(seconds("-0.000000250"), Some(-250));
    }

    #[test]
    fn test_output_line() {
        assert_eq!(output_line("| hello"), "hello");
        assert_eq!(output_line("hello"), "hello");
    }
}
