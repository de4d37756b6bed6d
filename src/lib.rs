//! Replay recorded IMU samples as if they were streaming from live hardware.
//!
//! IMU Replay turns a CSV recording of accelerometer and gyroscope readings into
//! packets, splits each packet into MTU-sized fragments, and delivers them to a
//! single peer at a paced rate. A receiver pipeline can then be exercised
//! without the sensor attached.
//!
//! # Features
//!
//! - **Sources**: canonical IMU CSV and raw serial-log captures
//! - **Encodings**: fixed-size little-endian wire format or CBOR
//! - **Fragmentation**: lossless split and reassembly with an 8-byte header
//! - **Transports**: in-process loopback and single-peer TCP
//! - **Pacing**: fixed interval or recorded timestamp deltas, with looping
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use imu_replay::{Replay, ReplayConfig, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> imu_replay::Result<()> {
//!     let transport = TcpTransport::new("127.0.0.1:7878");
//!     let scheduler = Replay::open("recording.csv", ReplayConfig::default(), transport)?;
//!     let (handle, task) = scheduler.spawn();
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop();
//!
//!     let report = task.await.expect("replay task panicked");
//!     println!("sent {} packets", report.stats.packets_sent);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
mod error;
pub mod fragment;
pub mod scheduler;
pub mod source;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod types;

pub use error::*;

pub use codec::{CborEncoder, Encoding, PacketEncoder, WireEncoder};
pub use config::ReplayConfig;
pub use fragment::{Reassembler, Reassembly, reassemble, split};
pub use scheduler::{ReplayHandle, ReplayReport, Scheduler, SchedulerState, SessionStats};
pub use source::{CsvSource, ReadingSource, VecSource};
pub use transport::{
    Connection, DeliveryMode, Endpoint, LoopbackPeer, LoopbackTransport, TcpReceiver,
    TcpTransport, Transport,
};
pub use types::{Fragment, PacingMode, Packet, Reading};

use std::path::Path;

/// Entry point for building replay sessions.
///
/// # Examples
///
/// ```rust,no_run
/// use imu_replay::{LoopbackTransport, Replay, ReplayConfig};
///
/// # #[tokio::main]
/// # async fn main() -> imu_replay::Result<()> {
/// let (transport, peer) = LoopbackTransport::pair();
/// let link = peer.connect()?;
/// let report = Replay::open("recording.csv", ReplayConfig::default(), transport)?.run().await;
/// # Ok(())
/// # }
/// ```
pub struct Replay;

impl Replay {
    /// Open a CSV recording and build a scheduler that replays it over `transport`.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::File`] if the recording cannot be read
    /// - [`ReplayError::SchemaMismatch`] if the header lacks required columns
    /// - [`ReplayError::InvalidMtu`] or [`ReplayError::Config`] for invalid settings
    pub fn open<T: Transport>(
        path: impl AsRef<Path>,
        config: ReplayConfig,
        transport: T,
    ) -> Result<Scheduler<CsvSource, T>> {
        config.validate()?;
        let source = CsvSource::open(path)?;
        Scheduler::new(config, source, transport)
    }

    /// Replay an in-memory set of readings.
    pub fn from_readings<T: Transport>(
        readings: Vec<Reading>,
        config: ReplayConfig,
        transport: T,
    ) -> Result<Scheduler<VecSource, T>> {
        Scheduler::new(config, VecSource::new(readings), transport)
    }
}
