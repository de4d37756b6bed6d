//! Test utilities for building recordings and packets
//!
//! Shared by unit tests and the fragmentation benchmark.

#![cfg(any(test, feature = "benchmark"))]

use crate::types::Reading;

/// Canonical CSV header row
pub const CANONICAL_HEADER: &str = "sensor_id,timestamp_count,aclr_x,aclr_y,aclr_z,rot_x,rot_y,rot_z";

/// One canonical CSV row with fixed axis values
pub fn canonical_row(sensor_id: u32, timestamp_count: u64) -> String {
    format!("{},{},10,20,30,1,2,3", sensor_id, timestamp_count)
}

/// Canonical CSV text with one row per timestamp
pub fn canonical_csv(timestamps: &[u64]) -> String {
    let mut csv = String::from(CANONICAL_HEADER);
    csv.push('\n');
    for &timestamp in timestamps {
        csv.push_str(&canonical_row(1, timestamp));
        csv.push('\n');
    }
    csv
}

/// `count` readings spaced `step` ticks apart
pub fn sample_readings(count: usize, step: u64) -> Vec<Reading> {
    (0..count)
        .map(|i| {
            let base = i as u32;
            Reading::new(1, 123_456_789 + step * i as u64, [base, base + 1, base + 2], [7, 8, 9])
        })
        .collect()
}

/// Deterministic byte buffer of the given length
pub fn sample_buffer(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CsvSource, ReadingSource};

    #[test]
    fn canonical_csv_parses() {
        let mut source = CsvSource::from_text(canonical_csv(&[5, 6, 7])).unwrap();
        let readings = source.next_batch(10);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[2].timestamp_count, 7);
        assert_eq!(readings[0].acceleration(), [10, 20, 30]);
    }

    #[test]
    fn sample_readings_are_spaced() {
        let readings = sample_readings(3, 100);
        assert_eq!(readings[1].timestamp_count - readings[0].timestamp_count, 100);
    }
}
