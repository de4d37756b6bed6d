//! Mutable replay state owned by the scheduler

use serde::Serialize;
use std::fmt;

use crate::types::Reading;
use crate::ReplayError;

/// Lifecycle of a replay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Advertising,
    Connected,
    Streaming,
    Looping,
    Draining,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Advertising => "advertising",
            SchedulerState::Connected => "connected",
            SchedulerState::Streaming => "streaming",
            SchedulerState::Looping => "looping",
            SchedulerState::Draining => "draining",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters accumulated over a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Packets whose fragments were all attempted
    pub packets_sent: u64,
    pub fragments_sent: u64,
    /// Fragments given up on after a retried timeout
    pub fragments_dropped: u64,
    pub send_timeouts: u64,
    /// Packets that failed to encode or fragment
    pub packets_skipped: u64,
    /// Packets cut short by a disconnect
    pub packets_abandoned: u64,
    pub rows_skipped: u64,
    pub completed_cycles: u64,
    pub connections: u64,
}

/// Terminal result of [`Scheduler::run`](super::Scheduler::run)
#[derive(Debug)]
pub struct ReplayReport {
    /// Always [`SchedulerState::Stopped`] once the run returns
    pub state: SchedulerState,

    /// Error that ended the session, if any
    pub last_error: Option<ReplayError>,

    /// Packet being processed when that error occurred
    pub failed_packet_id: Option<u32>,

    pub stats: SessionStats,
}

impl ReplayReport {
    /// Whether the session ended without a fatal error
    pub fn is_clean(&self) -> bool {
        self.last_error.is_none()
    }
}

/// Replay cursor state that survives reconnects
#[derive(Debug, Default)]
pub(crate) struct Session {
    next_packet_id: u32,
    last_timestamp: Option<u64>,
    /// Batch pulled from the source but not yet on the wire
    held_batch: Option<Vec<Reading>>,
    pub(crate) stats: SessionStats,
}

impl Session {
    /// Allocate the next packet id; ids wrap only at `u32::MAX`
    pub(crate) fn take_packet_id(&mut self) -> u32 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        id
    }

    /// Hand back an id that was taken but never reached the wire
    pub(crate) fn release_packet_id(&mut self, id: u32) {
        if id.wrapping_add(1) == self.next_packet_id {
            self.next_packet_id = id;
        }
    }

    /// Last timestamp of the most recent batch that was put on the wire
    pub(crate) fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Record the last timestamp of a batch and return the previous one
    pub(crate) fn advance_timestamp(&mut self, timestamp: u64) -> Option<u64> {
        self.last_timestamp.replace(timestamp)
    }

    /// Keep a batch for the next connection
    pub(crate) fn hold_batch(&mut self, batch: Vec<Reading>) {
        self.held_batch = Some(batch);
    }

    pub(crate) fn take_held_batch(&mut self) -> Option<Vec<Reading>> {
        self.held_batch.take()
    }

    /// Fold the skipped-row count of a finished pass into the totals
    pub(crate) fn close_pass(&mut self, skipped_rows: usize) {
        self.stats.rows_skipped += skipped_rows as u64;
        self.stats.completed_cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_ids_wrap_at_u32_max() {
        let mut session = Session { next_packet_id: u32::MAX, ..Session::default() };
        assert_eq!(session.take_packet_id(), u32::MAX);
        assert_eq!(session.take_packet_id(), 0);
    }

    #[test]
    fn timestamps_are_chained() {
        let mut session = Session::default();
        assert_eq!(session.advance_timestamp(10), None);
        assert_eq!(session.advance_timestamp(20), Some(10));
    }

    #[test]
    fn released_id_is_reused() {
        let mut session = Session::default();
        assert_eq!(session.take_packet_id(), 0);
        let id = session.take_packet_id();
        session.release_packet_id(id);
        assert_eq!(session.take_packet_id(), 1);

        // Only the most recent id can be handed back.
        session.release_packet_id(0);
        assert_eq!(session.take_packet_id(), 2);
    }

    #[test]
    fn held_batch_is_taken_once() {
        let mut session = Session::default();
        assert!(session.take_held_batch().is_none());
        session.hold_batch(vec![Reading::new(1, 10, [0; 3], [0; 3])]);
        assert_eq!(session.take_held_batch().map(|batch| batch.len()), Some(1));
        assert!(session.take_held_batch().is_none());
    }

    #[test]
    fn state_names() {
        assert_eq!(SchedulerState::Advertising.to_string(), "advertising");
        assert_eq!(SchedulerState::Stopped.to_string(), "stopped");
    }
}
