//! Packs the per-entry "is a directory" flags into a minimal bitfield.
//!
//! Bit `i` lives in byte `i / 8` at position `7 - i % 8` (MSB first).

use crate::error::ProtocolError;

/// Number of bytes needed to hold `count` flags.
pub const fn packed_len(count: usize) -> usize {
    (count + 7) / 8
}

pub fn encode(flags: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; packed_len(flags.len())];
    for (i, _) in flags.iter().enumerate().filter(|(_, set)| **set) {
        packed[i / 8] |= 1 << (7 - (i % 8));
    }
    packed
}

/// Inverse of [`encode`]. Bits past `count` in the last byte are ignored.
pub fn decode(packed: &[u8], count: usize) -> Result<Vec<bool>, ProtocolError> {
    let needed = packed_len(count);
    if packed.len() < needed {
        return Err(ProtocolError::Truncated {
            offset: 0,
            needed,
            available: packed.len(),
        });
    }
    Ok((0..count)
        .map(|i| packed[i / 8] & (1 << (7 - (i % 8))) != 0)
        .collect())
}
