//! Sensor reading type

use serde::{Deserialize, Serialize};

/// One row of IMU measurements.
///
/// Readings are immutable once parsed. Their identity is their position in the
/// source; duplicate rows are replayed as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reading {
    /// Sensor that produced the sample
    pub sensor_id: u32,

    /// Device tick count at capture time
    pub timestamp_count: u64,

    /// Acceleration, X axis (raw counts)
    pub aclr_x: u32,

    /// Acceleration, Y axis (raw counts)
    pub aclr_y: u32,

    /// Acceleration, Z axis (raw counts)
    pub aclr_z: u32,

    /// Rotation rate, X axis (raw counts)
    pub rot_x: u32,

    /// Rotation rate, Y axis (raw counts)
    pub rot_y: u32,

    /// Rotation rate, Z axis (raw counts)
    pub rot_z: u32,
}

impl Reading {
    /// Column names a canonical recording must provide, in wire order.
    pub const FIELDS: [&'static str; 8] =
        ["sensor_id", "timestamp_count", "aclr_x", "aclr_y", "aclr_z", "rot_x", "rot_y", "rot_z"];

    /// Build a reading from its sensor, timestamp and the two axis triples.
    pub fn new(sensor_id: u32, timestamp_count: u64, aclr: [u32; 3], rot: [u32; 3]) -> Self {
        Self {
            sensor_id,
            timestamp_count,
            aclr_x: aclr[0],
            aclr_y: aclr[1],
            aclr_z: aclr[2],
            rot_x: rot[0],
            rot_y: rot[1],
            rot_z: rot[2],
        }
    }

    /// Acceleration as an `[x, y, z]` triple.
    pub fn acceleration(&self) -> [u32; 3] {
        [self.aclr_x, self.aclr_y, self.aclr_z]
    }

    /// Rotation as an `[x, y, z]` triple.
    pub fn rotation(&self) -> [u32; 3] {
        [self.rot_x, self.rot_y, self.rot_z]
    }
}
