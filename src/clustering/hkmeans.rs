//! Recursive hierarchical k-means / k-majority clustering.
//!
//! Each node of the vocabulary runs one bounded Lloyd round over the
//! descriptors that reached it, then hands each resulting cluster to a child
//! and recurses. The element-specific parts — distance and centroid
//! recomputation — go through [`DescriptorKind`], so the same loop trains
//! real (k-means) and binary (k-majority) vocabularies.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::clustering::centers::{choose_centers, CentersInit};
use crate::clustering::observer::BuildObserver;
use crate::dataset::Dataset;
use crate::descriptor::DescriptorKind;
use crate::error::{Result, VocabError};
use crate::tree::{NodeKind, TreeNode};

/// Bound on Lloyd iterations when the caller asked for an uncapped run
/// (`max_iterations < 0`).
pub const MAX_LLOYD_ITERATIONS: usize = 1 << 20;

/// One tree-building pass over a dataset.
///
/// Owns the node arena while it grows; [`TreeBuilder::run`] hands the arena
/// and the leaf table back to the tree on success.
pub(crate) struct TreeBuilder<'a, K: DescriptorKind, D: Dataset<K> + ?Sized> {
    data: &'a D,
    branching: usize,
    depth: usize,
    max_iterations: usize,
    init: CentersInit,
    rng: StdRng,
    observer: &'a mut dyn BuildObserver,
    nodes: Vec<TreeNode<K>>,
    words: Vec<u32>,
}

impl<'a, K: DescriptorKind, D: Dataset<K> + ?Sized> TreeBuilder<'a, K, D> {
    pub fn new(
        data: &'a D,
        branching: usize,
        depth: usize,
        max_iterations: usize,
        init: CentersInit,
        seed: u64,
        observer: &'a mut dyn BuildObserver,
    ) -> Self {
        Self {
            data,
            branching,
            depth,
            max_iterations,
            init,
            rng: StdRng::seed_from_u64(seed),
            observer,
            nodes: Vec::new(),
            words: Vec::new(),
        }
    }

    /// Cluster the whole dataset, returning the pre-order node arena and the
    /// node index of every word.
    pub fn run(mut self) -> Result<(Vec<TreeNode<K>>, Vec<u32>)> {
        let mut indices: Vec<u32> = (0..self.data.rows() as u32).collect();
        let root = self.alloc_node(vec![K::Elem::default(); self.data.cols()]);
        self.cluster(root, &mut indices, 0)?;
        Ok((self.nodes, self.words))
    }

    /// Append a node; the arena position is the pre-order node id.
    fn alloc_node(&mut self, center: Vec<K::Elem>) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(TreeNode {
            center,
            kind: NodeKind::Interior(Vec::new()),
        });
        id
    }

    fn seal_leaf(&mut self, node: u32, level: usize, points: usize) {
        let word = self.words.len() as u32;
        self.nodes[node as usize].kind = NodeKind::Leaf(word);
        self.words.push(node);
        self.observer.leaf_created(level, points);
    }

    fn cluster(&mut self, node: u32, indices: &mut [u32], level: usize) -> Result<()> {
        if self.observer.cancelled() {
            return Err(VocabError::Cancelled);
        }

        // Descriptors traverse the tree in index order downstream (caches,
        // equality checks), so each partition is normalized on entry. The
        // clustering itself is unaffected: every index here already belongs
        // to this node.
        if level > 1 {
            indices.sort_unstable();
        }

        if level == self.depth || indices.len() < self.branching {
            self.seal_leaf(node, level, indices.len());
            return Ok(());
        }

        self.observer.cluster_started(level, indices.len());

        let seeds = choose_centers::<K, D>(self.init, self.branching, indices, self.data, &mut self.rng);
        if seeds.len() < self.branching {
            // Not enough distinct points to split.
            self.seal_leaf(node, level, indices.len());
            return Ok(());
        }

        let veclen = self.data.cols();
        let mut centers: Vec<Vec<K::Elem>> = seeds
            .iter()
            .map(|&s| self.data.row(s as usize).to_vec())
            .collect();

        // Initial assignment against the seed centers.
        let mut belongs_to = vec![0usize; indices.len()];
        let mut distance_to: Vec<K::Dist> = Vec::with_capacity(indices.len());
        let mut counts = vec![0usize; self.branching];
        for (i, &idx) in indices.iter().enumerate() {
            let (best, dist) = nearest_center::<K>(self.data.row(idx as usize), &centers);
            belongs_to[i] = best;
            distance_to.push(dist);
            counts[best] += 1;
        }

        let mut iteration = 0;
        let mut converged = false;
        while !converged && iteration < self.max_iterations {
            converged = true;
            iteration += 1;

            // Recompute centers from the current membership. Empty clusters
            // stay zeroed until repair moves a point into them.
            let mut accums: Vec<K::Accum> =
                (0..self.branching).map(|_| K::accumulator(veclen)).collect();
            for (i, &idx) in indices.iter().enumerate() {
                K::accumulate(&mut accums[belongs_to[i]], self.data.row(idx as usize));
            }
            for (c, acc) in accums.iter().enumerate() {
                K::finish_center(acc, counts[c], &mut centers[c]);
            }

            // Reassign.
            for (i, &idx) in indices.iter().enumerate() {
                let (best, dist) = nearest_center::<K>(self.data.row(idx as usize), &centers);
                if best != belongs_to[i] {
                    counts[belongs_to[i]] -= 1;
                    counts[best] += 1;
                    belongs_to[i] = best;
                    converged = false;
                }
                distance_to[i] = dist;
            }

            // Repair empty clusters: each takes the farthest member of the
            // currently largest cluster. Repairs apply sequentially and see
            // the counts left by earlier ones.
            for c in 0..self.branching {
                if counts[c] != 0 {
                    continue;
                }
                let mut largest = 0;
                for k in 1..self.branching {
                    if counts[k] > counts[largest] {
                        largest = k;
                    }
                }
                let mut farthest: Option<usize> = None;
                for i in 0..indices.len() {
                    if belongs_to[i] != largest {
                        continue;
                    }
                    if farthest.is_none_or(|f| distance_to[f] < distance_to[i]) {
                        farthest = Some(i);
                    }
                }
                if let Some(i) = farthest {
                    counts[largest] -= 1;
                    counts[c] += 1;
                    belongs_to[i] = c;
                }
            }
        }
        self.observer.node_clustered(level, iteration, converged);

        // Split `indices` into contiguous per-cluster ranges matching the
        // final labeling, then recurse child by child so node ids stay
        // pre-order.
        let mut start = 0;
        let mut end = 0;
        for c in 0..self.branching {
            for i in end..indices.len() {
                if belongs_to[i] == c {
                    indices.swap(i, end);
                    belongs_to.swap(i, end);
                    end += 1;
                }
            }
            let child = self.alloc_node(centers[c].clone());
            if let NodeKind::Interior(children) = &mut self.nodes[node as usize].kind {
                children.push(child);
            }
            self.cluster(child, &mut indices[start..end], level + 1)?;
            start = end;
        }

        Ok(())
    }
}

/// Index and distance of the center nearest to `row`; ties break toward the
/// lowest index.
fn nearest_center<K: DescriptorKind>(
    row: &[K::Elem],
    centers: &[Vec<K::Elem>],
) -> (usize, K::Dist) {
    let mut best = 0;
    let mut best_dist = K::distance(row, &centers[0]);
    for (j, center) in centers.iter().enumerate().skip(1) {
        let d = K::distance(row, center);
        if d < best_dist {
            best = j;
            best_dist = d;
        }
    }
    (best, best_dist)
}
