//! Core types for the replay pipeline.
//!
//! ## Architecture
//!
//! - [`Reading`] is one parsed row of IMU measurements
//! - [`Packet`] groups readings with schema metadata before serialization
//! - [`Fragment`] is one MTU-bounded slice of a serialized packet plus its
//!   reassembly header
//! - [`PacingMode`] controls the delay between packets
//!
//! ## Usage Example
//!
//! ```rust
//! use imu_replay::types::{Fragment, Packet, Reading};
//!
//! let reading = Reading::new(1, 123_456_789, [10, 20, 30], [1, 2, 3]);
//! let packet = Packet::new(0, vec![reading]);
//! assert_eq!(packet.readings.len(), 1);
//!
//! let fragment = Fragment { packet_id: 0, sequence_index: 0, total_fragments: 1, payload: vec![0xAB] };
//! let parsed = Fragment::from_bytes(&fragment.to_bytes()).unwrap();
//! assert_eq!(parsed, fragment);
//! ```

mod fragment;
mod pacing;
mod packet;
mod reading;

pub use fragment::{FRAGMENT_HEADER_LEN, Fragment};
pub use pacing::PacingMode;
pub use packet::{Packet, PacketType, SCHEMA_VERSION};
pub use reading::Reading;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use proptest::prelude::*;

    prop_compose! {
        fn arb_fragment()(
            packet_id in any::<u32>(),
            total_fragments in 1u16..=u16::MAX,
            index_seed in any::<u16>(),
            payload in prop::collection::vec(any::<u8>(), 0..64)
        ) -> Fragment {
            Fragment {
                packet_id,
                sequence_index: index_seed % total_fragments,
                total_fragments,
                payload,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_fragment_header_is_lossless(fragment in arb_fragment()) {
            let bytes = fragment.to_bytes();
            prop_assert_eq!(bytes.len(), fragment.wire_len());
            let parsed = Fragment::from_bytes(&bytes).unwrap();
            prop_assert_eq!(parsed, fragment);
        }

        #[test]
        fn prop_short_buffers_are_rejected(data in prop::collection::vec(any::<u8>(), 0..FRAGMENT_HEADER_LEN)) {
            prop_assert!(Fragment::from_bytes(&data).is_err());
        }

        #[test]
        fn prop_timestamp_pacing_never_exceeds_cap(
            previous in any::<u64>(),
            current in any::<u64>(),
            tick_us in 1u64..10_000u64
        ) {
            let mode = PacingMode::Timestamp { tick_us, max_delay_ms: 250, fallback_ms: 20 };
            let delay = mode.delay_between(Some(previous), current);
            prop_assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn fragment_header_layout_is_little_endian() {
        let fragment = Fragment {
            packet_id: 0x0403_0201,
            sequence_index: 0x0605,
            total_fragments: 0x0807,
            payload: vec![0xFF],
        };
        assert_eq!(fragment.to_bytes(), vec![1, 2, 3, 4, 5, 6, 7, 8, 0xFF]);
    }

    #[test]
    fn fragment_header_rejects_bad_indices() {
        // total_fragments = 0
        assert!(Fragment::from_bytes(&[0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // sequence_index (2) >= total_fragments (2)
        assert!(Fragment::from_bytes(&[0, 0, 0, 0, 2, 0, 2, 0]).is_err());
    }

    #[test]
    fn last_fragment_detection() {
        let mut fragment =
            Fragment { packet_id: 9, sequence_index: 2, total_fragments: 3, payload: vec![] };
        assert!(fragment.is_last());
        fragment.sequence_index = 1;
        assert!(!fragment.is_last());
    }

    #[test]
    fn fixed_pacing_ignores_timestamps() {
        let mode = PacingMode::fixed(Duration::from_millis(40));
        assert_eq!(mode.delay_between(None, 0), Duration::from_millis(40));
        assert_eq!(mode.delay_between(Some(10), 1_000_000), Duration::from_millis(40));
        assert!(!mode.is_realistic());
    }

    #[test]
    fn timestamp_pacing_follows_deltas() {
        let mode = PacingMode::realistic(Duration::from_millis(50));
        assert!(mode.is_realistic());

        // 100 ticks of 1ms
        assert_eq!(mode.delay_between(Some(123_456_789), 123_456_889), Duration::from_millis(100));
        // first packet falls back
        assert_eq!(mode.delay_between(None, 123_456_789), Duration::from_millis(50));
        // loop wrap falls back
        assert_eq!(mode.delay_between(Some(500), 100), Duration::from_millis(50));
        // huge gaps are capped
        assert_eq!(mode.delay_between(Some(0), u64::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn packet_type_tags_round_trip() {
        assert_eq!(PacketType::from_tag(PacketType::PhonePacket.tag()), Some(PacketType::PhonePacket));
        assert_eq!(PacketType::from_tag(0), None);
    }

    #[test]
    fn reading_axes() {
        let reading = Reading::new(2, 5, [1, 2, 3], [4, 5, 6]);
        assert_eq!(reading.acceleration(), [1, 2, 3]);
        assert_eq!(reading.rotation(), [4, 5, 6]);
        assert_eq!(Reading::FIELDS.len(), 8);
    }
}
