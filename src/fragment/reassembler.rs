//! Receiver-side reassembly

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::types::Fragment;
use crate::{ReplayError, Result};

/// Outcome of feeding fragments to a reassembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// All fragments arrived; the original packet buffer
    Complete(Vec<u8>),

    /// Waiting for more fragments
    Incomplete { packet_id: u32, received: usize, total: u16 },
}

/// Counters kept by a [`Reassembler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Packets reassembled successfully
    pub completed: u64,

    /// Partial packets discarded because a newer packet started
    pub dropped: u64,

    /// Partial packets discarded by the completeness timeout
    pub timed_out: u64,

    /// Duplicate fragments ignored
    pub duplicates: u64,
}

struct PartialPacket {
    packet_id: u32,
    total: u16,
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
    started: Instant,
}

impl PartialPacket {
    fn new(packet_id: u32, total: u16) -> Self {
        Self { packet_id, total, slots: vec![None; total as usize], received: 0, started: Instant::now() }
    }

    fn progress(&self) -> Reassembly {
        Reassembly::Incomplete { packet_id: self.packet_id, received: self.received, total: self.total }
    }

    fn into_buffer(self) -> Vec<u8> {
        self.slots.into_iter().flatten().flatten().collect()
    }
}

/// Rebuilds packet buffers from fragments, one packet at a time.
///
/// Models a receiver without multi-packet buffering:
/// - fragments of one packet may arrive in any order
/// - a fragment of a different packet discards the partial set in progress
/// - a partial set older than the timeout is discarded on the next push or
///   [`expire`](Self::expire) call
/// - duplicate `(packet_id, sequence_index)` pairs keep the first copy
pub struct Reassembler {
    timeout: Option<Duration>,
    max_payload: Option<usize>,
    pending: Option<PartialPacket>,
    last_completed: Option<u32>,
    stats: ReassemblyStats,
}

impl Reassembler {
    /// Create a reassembler that discards partial packets after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..Self::without_timeout() }
    }

    /// Create a reassembler that waits indefinitely for missing fragments
    pub fn without_timeout() -> Self {
        Self {
            timeout: None,
            max_payload: None,
            pending: None,
            last_completed: None,
            stats: ReassemblyStats::default(),
        }
    }

    /// Reject fragments carrying more than `mtu` payload bytes
    pub fn with_max_payload(mut self, mtu: usize) -> Self {
        self.max_payload = Some(mtu);
        self
    }

    /// Counters since construction
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Packet id of the partial set in progress, if any
    pub fn pending_packet(&self) -> Option<u32> {
        self.pending.as_ref().map(|p| p.packet_id)
    }

    /// Forget any partial set, e.g. after the link dropped
    pub fn reset(&mut self) {
        if let Some(partial) = self.pending.take() {
            debug!(
                packet_id = partial.packet_id,
                received = partial.received,
                total = partial.total,
                "Abandoning partial packet"
            );
        }
        self.last_completed = None;
    }

    /// Discard the partial set if it outlived the completeness timeout.
    ///
    /// Returns [`ReplayError::ReassemblyTimeout`] describing the discarded set.
    pub fn expire(&mut self) -> Option<ReplayError> {
        let timeout = self.timeout?;
        let stale = self.pending.as_ref().is_some_and(|p| p.started.elapsed() >= timeout);
        if !stale {
            return None;
        }

        let partial = self.pending.take()?;
        self.stats.timed_out += 1;
        let error = ReplayError::ReassemblyTimeout {
            packet_id: partial.packet_id,
            received: partial.received,
            total: partial.total,
        };
        warn!("{}", error);
        Some(error)
    }

    /// Parse a transport payload and feed it in.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<Reassembly> {
        self.push(Fragment::from_bytes(data)?)
    }

    /// Feed one fragment.
    pub fn push(&mut self, fragment: Fragment) -> Result<Reassembly> {
        self.expire();
        self.validate(&fragment)?;

        if self.last_completed == Some(fragment.packet_id) {
            self.stats.duplicates += 1;
            trace!(
                packet_id = fragment.packet_id,
                index = fragment.sequence_index,
                "Ignoring fragment of completed packet"
            );
            return Ok(Reassembly::Incomplete {
                packet_id: fragment.packet_id,
                received: fragment.total_fragments as usize,
                total: fragment.total_fragments,
            });
        }

        let mut partial = match self.pending.take() {
            Some(partial) if partial.packet_id == fragment.packet_id => {
                if partial.total != fragment.total_fragments {
                    let error = ReplayError::decode_failed(
                        "fragment reassembly",
                        format!(
                            "packet {} announced {} fragments, fragment {} says {}",
                            partial.packet_id,
                            partial.total,
                            fragment.sequence_index,
                            fragment.total_fragments
                        ),
                    );
                    self.pending = Some(partial);
                    return Err(error);
                }
                partial
            }
            Some(partial) => {
                self.stats.dropped += 1;
                warn!(
                    dropped_packet = partial.packet_id,
                    received = partial.received,
                    total = partial.total,
                    new_packet = fragment.packet_id,
                    "Discarding incomplete packet"
                );
                PartialPacket::new(fragment.packet_id, fragment.total_fragments)
            }
            None => PartialPacket::new(fragment.packet_id, fragment.total_fragments),
        };

        let slot = &mut partial.slots[fragment.sequence_index as usize];
        if slot.is_some() {
            self.stats.duplicates += 1;
            trace!(
                packet_id = fragment.packet_id,
                index = fragment.sequence_index,
                "Ignoring duplicate fragment"
            );
        } else {
            *slot = Some(fragment.payload);
            partial.received += 1;
        }

        if partial.received == partial.total as usize {
            let packet_id = partial.packet_id;
            let buffer = partial.into_buffer();
            self.stats.completed += 1;
            self.last_completed = Some(packet_id);
            debug!(packet_id, bytes = buffer.len(), "Packet reassembled");
            return Ok(Reassembly::Complete(buffer));
        }

        let progress = partial.progress();
        self.pending = Some(partial);
        Ok(progress)
    }

    fn validate(&self, fragment: &Fragment) -> Result<()> {
        if fragment.total_fragments == 0 || fragment.sequence_index >= fragment.total_fragments {
            return Err(ReplayError::decode_failed(
                "fragment reassembly",
                format!(
                    "fragment {}/{} of packet {} is out of range",
                    fragment.sequence_index, fragment.total_fragments, fragment.packet_id
                ),
            ));
        }
        if let Some(mtu) = self.max_payload
            && fragment.payload.len() > mtu
        {
            return Err(ReplayError::decode_failed(
                "fragment reassembly",
                format!("payload of {} bytes exceeds MTU {}", fragment.payload.len(), mtu),
            ));
        }
        Ok(())
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Reassemble a set of fragments of one packet, in any arrival order.
///
/// Returns [`Reassembly::Incomplete`] when indices are missing. An empty set
/// reassembles to an empty buffer.
pub fn reassemble<I>(fragments: I) -> Result<Reassembly>
where
    I: IntoIterator<Item = Fragment>,
{
    let mut reassembler = Reassembler::without_timeout();
    let mut outcome = Reassembly::Complete(Vec::new());
    for fragment in fragments {
        outcome = reassembler.push(fragment)?;
    }
    Ok(outcome)
}
