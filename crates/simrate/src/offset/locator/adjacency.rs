//! Pointer-pair heuristics

use crate::memory::layout::offset::POINTER_SIZE;

/// Candidate offset addresses from sorted pointer hits.
///
/// Every adjacent pair of hits exactly `spacing` bytes apart marks the structure;
/// the candidate is the second hit plus `field_offset`.
pub fn adjacent_pointer_candidates(hits: &[u64], spacing: u64, field_offset: u64) -> Vec<u64> {
    hits.windows(2)
        .filter(|pair| pair[1].wrapping_sub(pair[0]) == spacing)
        .filter_map(|pair| pair[1].checked_add(field_offset))
        .collect()
}

/// Little-endian encoding of a pointer as it appears in the target's memory
pub fn pointer_pattern(address: u64) -> [u8; POINTER_SIZE] {
    address.to_le_bytes()
}
