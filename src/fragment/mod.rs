//! Fragmentation and reassembly of serialized packets.
//!
//! A packet buffer rarely fits one transport payload. [`split`] cuts it into
//! [`Fragment`](crate::types::Fragment)s of at most `mtu` payload bytes, each
//! tagged with the packet id, its index and the fragment count. The
//! [`Reassembler`] is the receiver-side counterpart used by the TCP receiver and
//! the test harness.
//!
//! ```rust
//! use imu_replay::fragment::{Reassembly, reassemble, split};
//!
//! let buffer: Vec<u8> = (0..=81).collect();
//! let mut fragments = split(&buffer, 1, 8).unwrap();
//! assert_eq!(fragments.len(), 11);
//!
//! fragments.reverse();
//! assert_eq!(reassemble(fragments).unwrap(), Reassembly::Complete(buffer));
//! ```

mod fragmenter;
mod reassembler;

pub use fragmenter::{fragment_count, split};
pub use reassembler::{Reassembler, ReassemblyStats, Reassembly, reassemble};
