//! Packet types shared by the encoders

use serde::{Deserialize, Serialize};

use super::Reading;

/// Current packet schema version.
pub const SCHEMA_VERSION: u8 = 1;

/// Packet type tag carried next to the schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    /// Batch of positional readings as produced by the phone firmware
    PhonePacket = 1,
}

impl PacketType {
    /// Wire tag for this packet type
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a wire tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PacketType::PhonePacket),
            _ => None,
        }
    }
}

/// One batch of readings before serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Schema version the packet was built against
    pub schema_version: u8,

    /// Packet type tag
    pub packet_type: PacketType,

    /// Monotonic packet counter assigned by the scheduler
    pub packet_id: u32,

    /// Readings in source order
    pub readings: Vec<Reading>,
}

impl Packet {
    /// Create a packet at the current schema version
    pub fn new(packet_id: u32, readings: Vec<Reading>) -> Self {
        Self { schema_version: SCHEMA_VERSION, packet_type: PacketType::PhonePacket, packet_id, readings }
    }
}
