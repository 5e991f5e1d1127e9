//! Seeding strategies for one k-means round.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::descriptor::DescriptorKind;

/// Strategy used to pick the initial centers of a clustering round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentersInit {
    /// Uniformly sampled distinct points.
    #[default]
    Random,
    /// Farthest-first traversal (Gonzales): each pick maximizes the minimum
    /// distance to the centers chosen so far.
    Gonzales,
    /// Picks weighted proportionally to the squared distance from the
    /// nearest existing center (k-means++).
    KmeansPp,
}

/// Choose up to `k` seed rows out of `candidates`.
///
/// Fewer than `k` indices come back only when the candidate set holds fewer
/// than `k` distinct points. Draws come from the caller's seeded rng, so a
/// fixed seed reproduces the same seeds on the same candidates.
pub(crate) fn choose_centers<K, D>(
    init: CentersInit,
    k: usize,
    candidates: &[u32],
    data: &D,
    rng: &mut StdRng,
) -> Vec<u32>
where
    K: DescriptorKind,
    D: Dataset<K> + ?Sized,
{
    match init {
        CentersInit::Random => random_centers::<K, D>(k, candidates, data, rng),
        CentersInit::Gonzales => gonzales_centers::<K, D>(k, candidates, data, rng),
        CentersInit::KmeansPp => kmeanspp_centers::<K, D>(k, candidates, data, rng),
    }
}

fn random_centers<K, D>(k: usize, candidates: &[u32], data: &D, rng: &mut StdRng) -> Vec<u32>
where
    K: DescriptorKind,
    D: Dataset<K> + ?Sized,
{
    let mut pool = candidates.to_vec();
    // Fisher-Yates over the candidate pool.
    for i in (1..pool.len()).rev() {
        pool.swap(i, rng.random_range(0..=i));
    }
    let mut centers: Vec<u32> = Vec::with_capacity(k);
    for &idx in &pool {
        let row = data.row(idx as usize);
        let duplicate = centers.iter().any(|&c| data.row(c as usize) == row);
        if !duplicate {
            centers.push(idx);
            if centers.len() == k {
                break;
            }
        }
    }
    centers
}

fn gonzales_centers<K, D>(k: usize, candidates: &[u32], data: &D, rng: &mut StdRng) -> Vec<u32>
where
    K: DescriptorKind,
    D: Dataset<K> + ?Sized,
{
    let mut centers: Vec<u32> = Vec::with_capacity(k);
    if candidates.is_empty() || k == 0 {
        return centers;
    }
    centers.push(candidates[rng.random_range(0..candidates.len())]);
    while centers.len() < k {
        let mut best: Option<(u32, f64)> = None;
        for &idx in candidates {
            let row = data.row(idx as usize);
            let closest = centers
                .iter()
                .map(|&c| K::distance(row, data.row(c as usize)).into())
                .fold(f64::INFINITY, f64::min);
            if best.is_none_or(|(_, d)| closest > d) {
                best = Some((idx, closest));
            }
        }
        match best {
            // A farthest distance of zero means every remaining candidate
            // duplicates a chosen center.
            Some((idx, d)) if d > 0.0 => centers.push(idx),
            _ => break,
        }
    }
    centers
}

fn kmeanspp_centers<K, D>(k: usize, candidates: &[u32], data: &D, rng: &mut StdRng) -> Vec<u32>
where
    K: DescriptorKind,
    D: Dataset<K> + ?Sized,
{
    let mut centers: Vec<u32> = Vec::with_capacity(k);
    if candidates.is_empty() || k == 0 {
        return centers;
    }
    let first = candidates[rng.random_range(0..candidates.len())];
    centers.push(first);

    let mut closest: Vec<f64> = candidates
        .iter()
        .map(|&idx| K::distance(data.row(idx as usize), data.row(first as usize)).into())
        .collect();

    while centers.len() < k {
        let total: f64 = closest.iter().sum();
        if total <= 0.0 {
            break;
        }
        let threshold = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        let mut pick = None;
        for (pos, &idx) in candidates.iter().enumerate() {
            if closest[pos] <= 0.0 {
                continue;
            }
            cumulative += closest[pos];
            pick = Some(idx);
            // Rounding can push the threshold past the final entry; the
            // last positive-weight candidate then wins.
            if cumulative >= threshold {
                break;
            }
        }
        let Some(chosen) = pick else { break };
        centers.push(chosen);
        for (pos, &idx) in candidates.iter().enumerate() {
            let d: f64 = K::distance(data.row(idx as usize), data.row(chosen as usize)).into();
            if d < closest[pos] {
                closest[pos] = d;
            }
        }
    }
    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DenseDataset;
    use crate::descriptor::RealL2;
    use rand::SeedableRng;

    fn corners() -> DenseDataset<RealL2> {
        DenseDataset::from_rows(&[
            vec![0.0, 0.0],
            vec![0.0, 10.0],
            vec![10.0, 0.0],
            vec![10.0, 10.0],
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_points_cap_the_center_count() {
        let data = DenseDataset::<RealL2>::from_rows(&vec![vec![1.0, 1.0]; 6]).unwrap();
        let candidates: Vec<u32> = (0..6).collect();
        for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
            let mut rng = StdRng::seed_from_u64(7);
            let centers = choose_centers::<RealL2, _>(init, 3, &candidates, &data, &mut rng);
            assert_eq!(centers.len(), 1, "{init:?} must collapse duplicates");
        }
    }

    #[test]
    fn chosen_centers_are_distinct_points() {
        let data = corners();
        let candidates: Vec<u32> = (0..4).collect();
        for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
            let mut rng = StdRng::seed_from_u64(99);
            let centers = choose_centers::<RealL2, _>(init, 4, &candidates, &data, &mut rng);
            assert_eq!(centers.len(), 4);
            let mut sorted = centers.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 4, "{init:?} repeated an index");
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_seeds() {
        let data = corners();
        let candidates: Vec<u32> = (0..4).collect();
        for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
            let mut rng_a = StdRng::seed_from_u64(1234);
            let mut rng_b = StdRng::seed_from_u64(1234);
            let a = choose_centers::<RealL2, _>(init, 2, &candidates, &data, &mut rng_a);
            let b = choose_centers::<RealL2, _>(init, 2, &candidates, &data, &mut rng_b);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn gonzales_spreads_to_the_far_corner() {
        let data = corners();
        let candidates: Vec<u32> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let centers =
            choose_centers::<RealL2, _>(CentersInit::Gonzales, 2, &candidates, &data, &mut rng);
        let d: f64 =
            RealL2::distance(data.row(centers[0] as usize), data.row(centers[1] as usize)).into();
        // Whatever the first pick, the second is a farthest point.
        assert!(d >= 100.0);
    }
}
