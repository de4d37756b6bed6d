//! CSV recording reader
//!
//! Two layouts are accepted:
//!
//! - **Canonical**: a header naming `sensor_id,timestamp_count,aclr_x,aclr_y,aclr_z,
//!   rot_x,rot_y,rot_z` in any order. Extra columns are ignored.
//! - **Serial log**: a `timestamp,data` header where `data` holds raw logger
//!   lines. `accel` lines set the pending acceleration and each `gyro` line emits
//!   one reading.
//!
//! ## Usage Example
//!
//! ```rust
//! use imu_replay::source::{CsvSource, ReadingSource};
//!
//! let csv = "sensor_id,timestamp_count,aclr_x,aclr_y,aclr_z,rot_x,rot_y,rot_z\n\
//!            1,100,1,2,3,4,5,6\n\
//!            1,oops,1,2,3,4,5,6\n\
//!            1,200,1,2,3,4,5,6\n";
//! let mut source = CsvSource::from_text(csv)?;
//!
//! let batch = source.next_batch(10);
//! assert_eq!(batch.len(), 2);
//! assert_eq!(source.skipped_rows(), 1);
//! # Ok::<(), imu_replay::ReplayError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ReadingSource;
use super::serial_log::{self, MISSING, SerialLine};
use crate::types::Reading;
use crate::{ReplayError, Result};

const SERIAL_COLUMNS: [&str; 2] = ["timestamp", "data"];

/// Column layout detected from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Canonical columns; indices follow [`Reading::FIELDS`] order
    Canonical { columns: [usize; 8] },

    /// `timestamp,data` serial capture
    SerialLog { timestamp: usize, data: usize },
}

/// Restartable CSV reading source
///
/// The file is loaded into memory when opened; rows are parsed lazily as the
/// scheduler pulls them.
pub struct CsvSource {
    text: String,
    path: PathBuf,
    layout: CsvLayout,
    data_start: usize,
    position: usize,
    line_number: usize,
    skipped: usize,
    emitted: usize,
    pending_accel: [u32; 3],
    end_reported: bool,
}

impl CsvSource {
    /// Open a CSV recording
    ///
    /// # Errors
    ///
    /// - [`ReplayError::File`] if the file cannot be read
    /// - [`ReplayError::SchemaMismatch`] if the header is missing or lacks
    ///   required columns
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ReplayError::file_error(path.to_path_buf(), e))?;
        Self::from_text_with_path(text, path.to_path_buf())
    }

    /// Create a source from CSV text
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        Self::from_text_with_path(text.into(), PathBuf::from("<memory>"))
    }

    fn from_text_with_path(text: String, path: PathBuf) -> Result<Self> {
        let header_end = text.find('\n').unwrap_or(text.len());
        let header = text[..header_end].trim_end_matches('\r').trim_start_matches('\u{feff}');
        let layout = parse_header(header)?;
        let data_start = (header_end + 1).min(text.len());

        info!("Opened recording {} ({:?})", path.display(), layout);

        Ok(Self {
            text,
            path,
            layout,
            data_start,
            position: data_start,
            line_number: 2,
            skipped: 0,
            emitted: 0,
            pending_accel: [MISSING; 3],
            end_reported: false,
        })
    }

    /// Detected column layout
    pub fn layout(&self) -> CsvLayout {
        self.layout
    }

    /// Path the recording was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Readings produced during the current pass
    pub fn rows_emitted(&self) -> usize {
        self.emitted
    }

    /// Parse the next row, surfacing row errors instead of skipping them.
    ///
    /// Row numbers in errors are 1-based file line numbers (the header is line 1).
    pub fn next_row(&mut self) -> Option<Result<Reading>> {
        loop {
            let (line_number, start, end) = self.next_line()?;
            let line = &self.text[start..end];
            if line.trim().is_empty() {
                continue;
            }

            let fields = split_fields(line);
            match self.layout {
                CsvLayout::Canonical { columns } => {
                    return Some(parse_canonical(line_number, &fields, &columns));
                }
                CsvLayout::SerialLog { timestamp, data } => {
                    let data_field = fields.get(data).copied().unwrap_or("");
                    match serial_log::classify(data_field) {
                        SerialLine::Accel(aclr) => self.pending_accel = aclr,
                        SerialLine::Gyro(rot) => {
                            let ts = fields.get(timestamp).copied().unwrap_or("");
                            let count = serial_log::timestamp_to_count(ts);
                            return Some(Ok(Reading::new(1, count, self.pending_accel, rot)));
                        }
                        SerialLine::Other => {}
                    }
                }
            }
        }
    }

    // Returns the line number and byte range of the next line, without its terminator.
    fn next_line(&mut self) -> Option<(usize, usize, usize)> {
        if self.position >= self.text.len() {
            return None;
        }

        let start = self.position;
        let rest = &self.text[start..];
        let len = rest.find('\n').unwrap_or(rest.len());
        let end = if rest[..len].ends_with('\r') { start + len - 1 } else { start + len };
        let line_number = self.line_number;

        self.position += len + 1;
        self.line_number += 1;
        Some((line_number, start, end))
    }
}

impl ReadingSource for CsvSource {
    fn next_reading(&mut self) -> Option<Reading> {
        loop {
            match self.next_row() {
                Some(Ok(reading)) => {
                    self.emitted += 1;
                    return Some(reading);
                }
                Some(Err(e)) => {
                    self.skipped += 1;
                    warn!("Skipping row: {}", e);
                }
                None => {
                    if !self.end_reported {
                        self.end_reported = true;
                        info!(
                            "End of recording {}: {} readings, {} rows skipped",
                            self.path.display(),
                            self.emitted,
                            self.skipped
                        );
                    }
                    return None;
                }
            }
        }
    }

    fn rewind(&mut self) {
        debug!("Rewinding recording {}", self.path.display());
        self.position = self.data_start;
        self.line_number = 2;
        self.skipped = 0;
        self.emitted = 0;
        self.pending_accel = [MISSING; 3];
        self.end_reported = false;
    }

    fn skipped_rows(&self) -> usize {
        self.skipped
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(|f| f.trim().trim_matches('"')).collect()
}

fn parse_header(header: &str) -> Result<CsvLayout> {
    let found: Vec<&str> = if header.trim().is_empty() { Vec::new() } else { split_fields(header) };
    let index_of = |name: &str| found.iter().position(|f| *f == name);

    let mut columns = [0usize; 8];
    let mut missing = Vec::new();
    for (slot, name) in columns.iter_mut().zip(Reading::FIELDS) {
        match index_of(name) {
            Some(index) => *slot = index,
            None => missing.push(name.to_string()),
        }
    }
    if missing.is_empty() {
        return Ok(CsvLayout::Canonical { columns });
    }

    if let (Some(timestamp), Some(data)) = (index_of(SERIAL_COLUMNS[0]), index_of(SERIAL_COLUMNS[1])) {
        return Ok(CsvLayout::SerialLog { timestamp, data });
    }

    Err(ReplayError::SchemaMismatch {
        missing,
        found: found.iter().map(|f| f.to_string()).collect(),
    })
}

fn parse_canonical(row: usize, fields: &[&str], columns: &[usize; 8]) -> Result<Reading> {
    let timestamp = required_field(row, fields, columns, 1)?;
    let timestamp_count = timestamp.parse::<u64>().map_err(|_| {
        ReplayError::malformed_row(
            row,
            Reading::FIELDS[1],
            format!("is not an unsigned 64-bit tick count: '{}'", timestamp),
        )
    })?;

    Ok(Reading {
        sensor_id: uint_field(row, fields, columns, 0)?,
        timestamp_count,
        aclr_x: uint_field(row, fields, columns, 2)?,
        aclr_y: uint_field(row, fields, columns, 3)?,
        aclr_z: uint_field(row, fields, columns, 4)?,
        rot_x: uint_field(row, fields, columns, 5)?,
        rot_y: uint_field(row, fields, columns, 6)?,
        rot_z: uint_field(row, fields, columns, 7)?,
    })
}

fn required_field<'a>(
    row: usize,
    fields: &[&'a str],
    columns: &[usize; 8],
    slot: usize,
) -> Result<&'a str> {
    match fields.get(columns[slot]) {
        Some(value) if !value.is_empty() => Ok(*value),
        _ => Err(ReplayError::malformed_row(row, Reading::FIELDS[slot], "is missing")),
    }
}

fn uint_field(row: usize, fields: &[&str], columns: &[usize; 8], slot: usize) -> Result<u32> {
    let value = required_field(row, fields, columns, slot)?;
    value.parse::<u32>().map_err(|_| {
        ReplayError::malformed_row(
            row,
            Reading::FIELDS[slot],
            format!("is not an unsigned integer: '{}'", value),
        )
    })
}
