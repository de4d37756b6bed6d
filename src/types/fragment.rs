//! Fragment wire shape
//!
//! Each fragment travels as `[packet_id: u32][sequence_index: u16]
//! [total_fragments: u16][payload]`, little-endian, in one transport payload slot.

use crate::{ReplayError, Result};

/// Size of the fragment header in bytes.
pub const FRAGMENT_HEADER_LEN: usize = 8;

/// One MTU-bounded piece of a serialized packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Packet this fragment belongs to
    pub packet_id: u32,

    /// Position of this fragment within the packet
    pub sequence_index: u16,

    /// Number of fragments the packet was split into
    pub total_fragments: u16,

    /// Slice of the packet buffer
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Whether this is the final fragment of its packet
    pub fn is_last(&self) -> bool {
        self.sequence_index as usize + 1 == self.total_fragments as usize
    }

    /// Size on the wire including the header
    pub fn wire_len(&self) -> usize {
        FRAGMENT_HEADER_LEN + self.payload.len()
    }

    /// Serialize header and payload into one transport payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.extend_from_slice(&self.packet_id.to_le_bytes());
        out.extend_from_slice(&self.sequence_index.to_le_bytes());
        out.extend_from_slice(&self.total_fragments.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a transport payload back into a fragment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAGMENT_HEADER_LEN {
            return Err(ReplayError::decode_failed(
                "fragment header",
                format!("need {} bytes, got {}", FRAGMENT_HEADER_LEN, data.len()),
            ));
        }

        let packet_id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let sequence_index = u16::from_le_bytes([data[4], data[5]]);
        let total_fragments = u16::from_le_bytes([data[6], data[7]]);

        if total_fragments == 0 {
            return Err(ReplayError::decode_failed(
                "fragment header",
                format!("packet {} declares zero fragments", packet_id),
            ));
        }
        if sequence_index >= total_fragments {
            return Err(ReplayError::decode_failed(
                "fragment header",
                format!(
                    "sequence index {} out of range for {} fragments",
                    sequence_index, total_fragments
                ),
            ));
        }

        Ok(Self {
            packet_id,
            sequence_index,
            total_fragments,
            payload: data[FRAGMENT_HEADER_LEN..].to_vec(),
        })
    }
}
