//! Packet splitting

use crate::types::Fragment;
use crate::{ReplayError, Result};

/// Number of fragments needed for `len` bytes at `mtu` bytes per fragment.
pub fn fragment_count(len: usize, mtu: usize) -> Result<usize> {
    if mtu == 0 {
        return Err(ReplayError::InvalidMtu { mtu });
    }
    Ok(len.div_ceil(mtu))
}

/// Split a packet buffer into ordered fragments of at most `mtu` payload bytes.
///
/// Every byte of `buffer` lands in exactly one fragment, in order, with no
/// padding. An empty buffer yields no fragments.
///
/// # Errors
///
/// - [`ReplayError::InvalidMtu`] when `mtu` is zero
/// - [`ReplayError::Encode`] when the packet would need more than `u16::MAX`
///   fragments
pub fn split(buffer: &[u8], packet_id: u32, mtu: usize) -> Result<Vec<Fragment>> {
    let count = fragment_count(buffer.len(), mtu)?;
    let total_fragments = u16::try_from(count).map_err(|_| {
        ReplayError::encode_failed(
            packet_id,
            format!(
                "{} bytes at MTU {} need {} fragments (max {})",
                buffer.len(),
                mtu,
                count,
                u16::MAX
            ),
        )
    })?;

    Ok(buffer
        .chunks(mtu)
        .enumerate()
        .map(|(index, chunk)| Fragment {
            packet_id,
            sequence_index: index as u16,
            total_fragments,
            payload: chunk.to_vec(),
        })
        .collect())
}
