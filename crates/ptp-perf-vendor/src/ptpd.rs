//! PTPd: a statistics CSV on stdout.

use chrono::{NaiveDateTime, TimeZone, Utc};
use ptp_perf_common::{seconds_to_nanos, ClientType, EndpointId, Error, Result, SampleType};
use ptp_perf_invoke::Invocation;
use ptp_perf_store::{LogRecord, Sample};
use tracing::warn;

use crate::parse::output_line;
use crate::vendor::VendorContext;

pub(crate) const LOG_SOURCE: &str = "ptpd";

const TIMESTAMP_COLUMN: &str = "# Timestamp";
const OFFSET_COLUMN: &str = "Offset From Master";
const DELAY_COLUMN: &str = "One Way Delay";
const SLAVE_ROW_MARKER: &str = ", slv, ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn daemon(context: &VendorContext<'_>) -> Result<Invocation> {
    let role = if context.client_type()? == ClientType::Master {
        "--masteronly"
    } else {
        "--slaveonly"
    };
    let config_file = context.paths.vendor_config_file();
    let invocation = Invocation::of_command([
        "ptpd",
        "-i",
        context.machine.ptp_interface.as_str(),
        "--verbose",
        role,
        "--config-file",
    ])
    .append_arg(config_file.to_string_lossy())
    .as_privileged();
    Ok(context.supervise(invocation))
}

struct Columns {
    timestamp: usize,
    offset: usize,
    delay: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let position = |name: &str| {
            names
                .iter()
                .position(|column| *column == name)
                .ok_or_else(|| Error::validation(format!("PTPd statistics header lacks column '{}'", name)))
        };
        Ok(Self {
            timestamp: position(TIMESTAMP_COLUMN)?,
            offset: position(OFFSET_COLUMN)?,
            delay: position(DELAY_COLUMN)?,
        })
    }
}

fn parse_row(columns: &Columns, row: &str) -> Option<(chrono::DateTime<Utc>, i64, i64)> {
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    let timestamp = NaiveDateTime::parse_from_str(fields.get(columns.timestamp)?, TIMESTAMP_FORMAT).ok()?;
    let offset = fields.get(columns.offset)?.parse::<f64>().ok()?;
    let delay = fields.get(columns.delay)?.parse::<f64>().ok()?;
    Some((
        Utc.from_utc_datetime(&timestamp),
        seconds_to_nanos(offset),
        seconds_to_nanos(delay),
    ))
}

/// Reads the statistics rows of a slave. All rows are parsed with the first
/// header line; the CSV timestamp is the sample time.
pub(crate) fn extract_samples(endpoint_id: EndpointId, records: &[LogRecord]) -> Result<Vec<Sample>> {
    let Some(header) = records
        .iter()
        .map(|record| output_line(&record.message))
        .find(|line| line.starts_with(TIMESTAMP_COLUMN))
    else {
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(header)?;

    let mut samples = Vec::new();
    for record in records {
        let line = output_line(&record.message);
        if !line.contains(SLAVE_ROW_MARKER) {
            continue;
        }
        let Some((timestamp, offset, delay)) = parse_row(&columns, line) else {
            warn!(record_id = record.id, "Skipping unparsable PTPd statistics row: {}", line);
            continue;
        };
        samples.push(Sample {
            endpoint_id,
            timestamp,
            sample_type: SampleType::ClockDiff,
            value: offset,
        });
        samples.push(Sample {
            endpoint_id,
            timestamp,
            sample_type: SampleType::PathDelay,
            value: delay,
        });
    }
    Ok(samples)
}
