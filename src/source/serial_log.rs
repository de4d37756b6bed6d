//! Serial log line parsing
//!
//! Serial captures store one sensor line per row (`accel x y z`, `gyro x y z`,
//! `temp t`, ...) next to an ISO-8601 timestamp. Missing or unparseable values
//! fall back to `1`, matching what the firmware logger writes for absent
//! channels.

use chrono::{DateTime, NaiveDateTime};

/// Value used for channels missing from a serial line
pub(crate) const MISSING: u32 = 1;

/// Classified serial data line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SerialLine {
    Accel([u32; 3]),
    Gyro([u32; 3]),
    Other,
}

/// Classify the `data` column of a serial log row.
pub(crate) fn classify(data: &str) -> SerialLine {
    let data = data.trim();
    if data.starts_with("accel") {
        SerialLine::Accel(axes(data))
    } else if data.starts_with("gyro") {
        SerialLine::Gyro(axes(data))
    } else {
        SerialLine::Other
    }
}

fn axes(data: &str) -> [u32; 3] {
    let parts: Vec<&str> = data.split_whitespace().collect();
    if parts.len() < 4 {
        return [MISSING; 3];
    }
    [to_count(parts[1]), to_count(parts[2]), to_count(parts[3])]
}

// Truncates toward zero; negative values saturate to 0.
fn to_count(value: &str) -> u32 {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => v.trunc() as u32,
        _ => MISSING,
    }
}

/// Milliseconds since the Unix epoch for an ISO-8601 timestamp.
///
/// Timestamps without an offset are read as UTC.
pub(crate) fn timestamp_to_count(timestamp: &str) -> u64 {
    let timestamp = timestamp.trim();

    let millis = if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        Some(dt.timestamp_millis())
    } else {
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(timestamp, format).ok())
            .map(|naive| naive.and_utc().timestamp_millis())
    };

    match millis {
        Some(ms) if ms >= 0 => ms as u64,
        _ => MISSING as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sensor_lines() {
        assert_eq!(classify("accel 1.9 -2 300"), SerialLine::Accel([1, 0, 300]));
        assert_eq!(classify("  gyro 4 5 6"), SerialLine::Gyro([4, 5, 6]));
        assert_eq!(classify("gyro 4 5"), SerialLine::Gyro([MISSING; 3]));
        assert_eq!(classify("accel x 2 3"), SerialLine::Accel([MISSING, 2, 3]));
        assert_eq!(classify("temp 21.5"), SerialLine::Other);
        assert_eq!(classify(""), SerialLine::Other);
    }

    #[test]
    fn parses_iso_timestamps() {
        assert_eq!(timestamp_to_count("1970-01-01T00:00:01"), 1_000);
        assert_eq!(timestamp_to_count("1970-01-01 00:00:01.250"), 1_250);
        assert_eq!(timestamp_to_count("1970-01-01T01:00:00+01:00"), 0);
        assert_eq!(timestamp_to_count("2024-03-01T12:00:00Z"), 1_709_294_400_000);
        assert_eq!(timestamp_to_count("yesterday"), MISSING as u64);
    }
}
