//! CBOR packet encoding

use super::PacketEncoder;
use crate::types::{Packet, Reading, SCHEMA_VERSION};
use crate::{ReplayError, Result};

/// Serializes [`Packet`] with `ciborium`.
///
/// Integers use their shortest CBOR form, so packet size varies with the values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborEncoder;

impl PacketEncoder for CborEncoder {
    fn encode(&self, readings: &[Reading], packet_id: u32) -> Result<Vec<u8>> {
        let packet = Packet::new(packet_id, readings.to_vec());
        let mut buf = Vec::new();
        ciborium::into_writer(&packet, &mut buf)
            .map_err(|e| ReplayError::encode_failed(packet_id, e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, data: &[u8]) -> Result<Packet> {
        let packet: Packet = ciborium::from_reader(data)
            .map_err(|e| ReplayError::decode_failed("cbor packet", e.to_string()))?;
        if packet.schema_version != SCHEMA_VERSION {
            return Err(ReplayError::decode_failed(
                "cbor packet",
                format!("unsupported schema version {}", packet.schema_version),
            ));
        }
        Ok(packet)
    }

    fn schema_version(&self) -> u8 {
        SCHEMA_VERSION
    }

    fn encoded_len(&self, _reading_count: usize) -> Option<usize> {
        None
    }
}
