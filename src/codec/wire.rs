//! Fixed-layout little-endian packet encoding (schema v1)
//!
//! ```text
//! [magic "IM": 2][schema_version: u8][packet_type: u8][packet_id: u32][reading_count: u16]
//! reading_count x [sensor_id: u32][timestamp_count: u64][aclr_x/y/z: u32][rot_x/y/z: u32]
//! ```

use super::PacketEncoder;
use crate::types::{Packet, PacketType, Reading, SCHEMA_VERSION};
use crate::{ReplayError, Result};

const MAGIC: [u8; 2] = *b"IM";

/// Packet header size in bytes
pub const PACKET_HEADER_LEN: usize = 10;

/// Encoded size of one reading in bytes
pub const READING_LEN: usize = 36;

/// Fixed-layout encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct WireEncoder;

impl PacketEncoder for WireEncoder {
    fn encode(&self, readings: &[Reading], packet_id: u32) -> Result<Vec<u8>> {
        let count = u16::try_from(readings.len()).map_err(|_| {
            ReplayError::encode_failed(
                packet_id,
                format!("{} readings exceed the u16 reading count", readings.len()),
            )
        })?;

        let mut out = Vec::with_capacity(PACKET_HEADER_LEN + READING_LEN * readings.len());
        out.extend_from_slice(&MAGIC);
        out.push(SCHEMA_VERSION);
        out.push(PacketType::PhonePacket.tag());
        out.extend_from_slice(&packet_id.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());

        for reading in readings {
            out.extend_from_slice(&reading.sensor_id.to_le_bytes());
            out.extend_from_slice(&reading.timestamp_count.to_le_bytes());
            for value in reading.acceleration().into_iter().chain(reading.rotation()) {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Packet> {
        if data.len() < PACKET_HEADER_LEN {
            return Err(ReplayError::decode_failed(
                "wire packet header",
                format!("need {} bytes, got {}", PACKET_HEADER_LEN, data.len()),
            ));
        }
        if data[0..2] != MAGIC {
            return Err(ReplayError::decode_failed("wire packet header", "bad magic"));
        }
        if data[2] != SCHEMA_VERSION {
            return Err(ReplayError::decode_failed(
                "wire packet header",
                format!("unsupported schema version {}", data[2]),
            ));
        }
        let packet_type = PacketType::from_tag(data[3]).ok_or_else(|| {
            ReplayError::decode_failed("wire packet header", format!("unknown packet type {}", data[3]))
        })?;

        let packet_id = read_u32(data, 4);
        let count = u16::from_le_bytes([data[8], data[9]]) as usize;

        let expected = PACKET_HEADER_LEN + READING_LEN * count;
        if data.len() != expected {
            return Err(ReplayError::decode_failed(
                "wire packet body",
                format!("{} readings need {} bytes, got {}", count, expected, data.len()),
            ));
        }

        let readings = data[PACKET_HEADER_LEN..]
            .chunks_exact(READING_LEN)
            .map(|chunk| {
                Reading::new(
                    read_u32(chunk, 0),
                    read_u64(chunk, 4),
                    [read_u32(chunk, 12), read_u32(chunk, 16), read_u32(chunk, 20)],
                    [read_u32(chunk, 24), read_u32(chunk, 28), read_u32(chunk, 32)],
                )
            })
            .collect();

        Ok(Packet { schema_version: SCHEMA_VERSION, packet_type, packet_id, readings })
    }

    fn schema_version(&self) -> u8 {
        SCHEMA_VERSION
    }

    fn encoded_len(&self, reading_count: usize) -> Option<usize> {
        if reading_count > u16::MAX as usize {
            return None;
        }
        Some(PACKET_HEADER_LEN + READING_LEN * reading_count)
    }
}

// Callers check bounds before slicing.
fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
