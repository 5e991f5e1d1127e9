//! Descriptor kinds: element type, distance kernel and centroid computation
//! bundled behind one trait.
//!
//! The clusterer and the tree never branch on the element type. Everything
//! kind-specific — how to measure distance, how to turn cluster members into
//! a centroid, how an element is spelled in a persisted file — goes through
//! [`DescriptorKind`], with two concrete instances:
//!
//! - [`RealL2`]: `f32` elements, squared-L2 distance, arithmetic-mean
//!   centroids.
//! - [`BinaryHamming`]: packed `u8` elements, Hamming distance, centroids by
//!   per-bit majority voting.

use std::fmt::Debug;

use crate::distance;
use crate::kmajority;

/// Capability bundle for one descriptor family.
pub trait DescriptorKind {
    /// Scalar element descriptors are made of.
    type Elem: Copy + PartialEq + Default + Debug + Send + Sync + 'static;
    /// Distance value produced by [`DescriptorKind::distance`].
    type Dist: Copy + PartialOrd + Into<f64>;
    /// Per-cluster state accumulated while recomputing a centroid.
    type Accum;

    /// Element tag in persisted tree files.
    const ELEMENT_TAG: char;
    /// Vocabulary type tag in persisted tree files.
    const VOCAB_TYPE: &'static str;

    /// Distance between two descriptors of equal length.
    fn distance(a: &[Self::Elem], b: &[Self::Elem]) -> Self::Dist;

    /// Fresh accumulator for a cluster of `veclen`-element descriptors.
    fn accumulator(veclen: usize) -> Self::Accum;

    /// Fold one cluster member into the accumulator.
    fn accumulate(acc: &mut Self::Accum, row: &[Self::Elem]);

    /// Turn the accumulated members into a centroid. `count` is the number
    /// of members folded in; a zero count zeroes the center.
    fn finish_center(acc: &Self::Accum, count: usize, center: &mut [Self::Elem]);

    /// Text form of one element for the persisted tree format.
    fn format_elem(v: Self::Elem) -> String;

    /// Parse one element back from its text form.
    fn parse_elem(tok: &str) -> Option<Self::Elem>;
}

/// Real-valued descriptors under squared L2; centroids are arithmetic means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealL2;

impl DescriptorKind for RealL2 {
    type Elem = f32;
    type Dist = f32;
    // Sums run in f64 so centroid precision does not degrade on big clusters.
    type Accum = Vec<f64>;

    const ELEMENT_TAG: char = 'f';
    const VOCAB_TYPE: &'static str = "HKM";

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        distance::l2_squared(a, b)
    }

    fn accumulator(veclen: usize) -> Vec<f64> {
        vec![0.0; veclen]
    }

    fn accumulate(acc: &mut Vec<f64>, row: &[f32]) {
        for (slot, &v) in acc.iter_mut().zip(row) {
            *slot += f64::from(v);
        }
    }

    fn finish_center(acc: &Vec<f64>, count: usize, center: &mut [f32]) {
        if count == 0 {
            center.fill(0.0);
            return;
        }
        for (out, &sum) in center.iter_mut().zip(acc) {
            *out = (sum / count as f64) as f32;
        }
    }

    fn format_elem(v: f32) -> String {
        // Shortest round-tripping decimal form.
        v.to_string()
    }

    fn parse_elem(tok: &str) -> Option<f32> {
        tok.parse().ok()
    }
}

/// Packed binary descriptors under Hamming distance; centroids come from
/// per-bit majority voting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryHamming;

impl DescriptorKind for BinaryHamming {
    type Elem = u8;
    type Dist = u32;
    type Accum = Vec<u32>;

    const ELEMENT_TAG: char = 'u';
    const VOCAB_TYPE: &'static str = "HKMAJ";

    #[inline]
    fn distance(a: &[u8], b: &[u8]) -> u32 {
        distance::hamming(a, b)
    }

    fn accumulator(veclen: usize) -> Vec<u32> {
        vec![0; veclen * 8]
    }

    fn accumulate(acc: &mut Vec<u32>, row: &[u8]) {
        kmajority::cum_bit_sum(row, acc);
    }

    fn finish_center(acc: &Vec<u32>, count: usize, center: &mut [u8]) {
        if count == 0 {
            center.fill(0);
            return;
        }
        kmajority::majority_voting(acc, center, count);
    }

    fn format_elem(v: u8) -> String {
        v.to_string()
    }

    fn parse_elem(tok: &str) -> Option<u8> {
        tok.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_center_is_the_mean() {
        let mut acc = RealL2::accumulator(2);
        RealL2::accumulate(&mut acc, &[1.0, 2.0]);
        RealL2::accumulate(&mut acc, &[3.0, 6.0]);
        let mut center = [0.0f32; 2];
        RealL2::finish_center(&acc, 2, &mut center);
        assert_eq!(center, [2.0, 4.0]);
    }

    #[test]
    fn empty_real_cluster_zeroes_the_center() {
        let acc = RealL2::accumulator(3);
        let mut center = [1.0f32; 3];
        RealL2::finish_center(&acc, 0, &mut center);
        assert_eq!(center, [0.0; 3]);
    }

    #[test]
    fn binary_center_is_the_majority() {
        let mut acc = BinaryHamming::accumulator(1);
        BinaryHamming::accumulate(&mut acc, &[0b1100_0000]);
        BinaryHamming::accumulate(&mut acc, &[0b1000_0000]);
        BinaryHamming::accumulate(&mut acc, &[0b1000_0001]);
        let mut center = [0u8];
        BinaryHamming::finish_center(&acc, 3, &mut center);
        assert_eq!(center, [0b1000_0000]);
    }

    #[test]
    fn real_elements_round_trip_through_text() {
        for v in [0.0f32, -1.5, 0.1, 123.456, f32::MIN_POSITIVE] {
            let text = RealL2::format_elem(v);
            assert_eq!(RealL2::parse_elem(&text), Some(v));
        }
    }
}
