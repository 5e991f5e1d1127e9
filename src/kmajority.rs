//! Bitwise centroid primitive for binary descriptors.
//!
//! Binary descriptors have no arithmetic mean, so the centroid of a cluster
//! is computed per bit instead: [`cum_bit_sum`] accumulates how often each
//! bit position is set across the members, and [`majority_voting`] keeps the
//! bits that a strict majority of members agree on.

/// Accumulate the bits of `src` into per-position counters.
///
/// `counters` holds one counter per bit position, `8 * src.len()` in total.
/// Counter `k * 8 + b` tracks bit `b` of byte `k`, most significant bit
/// first. [`majority_voting`] reads the same layout.
pub fn cum_bit_sum(src: &[u8], counters: &mut [u32]) {
    debug_assert_eq!(counters.len(), src.len() * 8);
    for (byte, slots) in src.iter().zip(counters.chunks_exact_mut(8)) {
        for (b, slot) in slots.iter_mut().enumerate() {
            *slot += u32::from(byte >> (7 - b) & 1);
        }
    }
}

/// Resolve accumulated counters into a centroid.
///
/// Bit `j` of `out` is set iff more than half of the `cluster_size` members
/// have it set. An exact half split, possible only for even sizes, resolves
/// to 0.
pub fn majority_voting(counters: &[u32], out: &mut [u8], cluster_size: usize) {
    debug_assert_eq!(counters.len(), out.len() * 8);
    let threshold = cluster_size as u64;
    for (byte, slots) in out.iter_mut().zip(counters.chunks_exact(8)) {
        let mut acc = 0u8;
        for (b, &votes) in slots.iter().enumerate() {
            if u64::from(votes) * 2 > threshold {
                acc |= 1 << (7 - b);
            }
        }
        *byte = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroid_of(members: &[&[u8]]) -> Vec<u8> {
        let veclen = members[0].len();
        let mut counters = vec![0u32; veclen * 8];
        for m in members {
            cum_bit_sum(m, &mut counters);
        }
        let mut out = vec![0u8; veclen];
        majority_voting(&counters, &mut out, members.len());
        out
    }

    #[test]
    fn majority_keeps_bit_set_in_two_of_three() {
        // Bit 7 (MSB of byte 0) set in members {1, 1, 0}.
        let out = centroid_of(&[&[0b1000_0000], &[0b1000_0000], &[0b0000_0000]]);
        assert_eq!(out, vec![0b1000_0000]);
    }

    #[test]
    fn even_split_resolves_to_zero() {
        // Two of four members set the bit: exact half, no majority.
        let out = centroid_of(&[
            &[0b0000_0001],
            &[0b0000_0001],
            &[0b0000_0000],
            &[0b0000_0000],
        ]);
        assert_eq!(out, vec![0b0000_0000]);
    }

    #[test]
    fn unanimous_members_reproduce_themselves() {
        let member = [0xA5_u8, 0x3C];
        let out = centroid_of(&[&member, &member, &member]);
        assert_eq!(out, member.to_vec());
    }

    #[test]
    fn counters_track_every_position_independently() {
        let mut counters = vec![0u32; 16];
        cum_bit_sum(&[0b1100_0000, 0b0000_0011], &mut counters);
        cum_bit_sum(&[0b1000_0000, 0b0000_0001], &mut counters);
        assert_eq!(counters[0], 2); // byte 0, bit 7
        assert_eq!(counters[1], 1); // byte 0, bit 6
        assert_eq!(counters[14], 1); // byte 1, bit 1
        assert_eq!(counters[15], 2); // byte 1, bit 0
    }

    #[test]
    fn single_member_cluster_is_copied_verbatim() {
        let out = centroid_of(&[&[0x5A, 0xFF, 0x00]]);
        assert_eq!(out, vec![0x5A, 0xFF, 0x00]);
    }
}
