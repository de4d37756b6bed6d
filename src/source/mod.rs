//! Reading sources.
//!
//! A source yields [`Reading`]s in recording order. Sources are restartable so
//! the scheduler can loop a recording without reopening it.

mod csv;
mod serial_log;

pub use csv::{CsvLayout, CsvSource};

use crate::types::Reading;

/// Trait for reading sources
///
/// Implementations validate their schema when they are constructed, so a
/// source that exists is known to be replayable. Per-row failures are handled
/// inside the source: the row is logged, counted and skipped.
pub trait ReadingSource: Send + 'static {
    /// Get the next reading
    ///
    /// Returns `None` at end of stream. Malformed rows are skipped, never
    /// returned.
    fn next_reading(&mut self) -> Option<Reading>;

    /// Restart from the first reading
    fn rewind(&mut self);

    /// Rows skipped as malformed during the current pass
    fn skipped_rows(&self) -> usize;

    /// Pull up to `max` readings
    fn next_batch(&mut self, max: usize) -> Vec<Reading> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next_reading() {
                Some(reading) => batch.push(reading),
                None => break,
            }
        }
        batch
    }
}

/// In-memory source, mostly useful for tests and synthetic replays
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    readings: Vec<Reading>,
    cursor: usize,
}

impl VecSource {
    /// Create a source over the given readings
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings, cursor: 0 }
    }
}

impl ReadingSource for VecSource {
    fn next_reading(&mut self) -> Option<Reading> {
        let reading = self.readings.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(reading)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn skipped_rows(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_stop_at_end_of_stream() {
        let readings: Vec<Reading> = (0..5).map(|i| Reading::new(1, i, [0; 3], [0; 3])).collect();
        let mut source = VecSource::new(readings);

        assert_eq!(source.next_batch(2).len(), 2);
        assert_eq!(source.next_batch(2).len(), 2);
        assert_eq!(source.next_batch(2).len(), 1);
        assert!(source.next_batch(2).is_empty());

        source.rewind();
        assert_eq!(source.next_reading().map(|r| r.timestamp_count), Some(0));
    }
}
