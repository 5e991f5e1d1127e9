//! The vocabulary tree: a hierarchical quantizer over descriptor space.
//!
//! Training recursively clusters the dataset into a complete B-ary tree (see
//! [`crate::clustering`]); every leaf is a visual word. At query time a
//! descriptor descends from the root, at each node moving to the child with
//! the nearest center, and lands in exactly one word.
//!
//! Nodes live in an arena ordered by pre-order creation, so the arena
//! position doubles as the node id that the persisted format stores.

mod io;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::clustering::hkmeans::{TreeBuilder, MAX_LLOYD_ITERATIONS};
use crate::clustering::observer::{BuildObserver, NullObserver};
use crate::clustering::CentersInit;
use crate::dataset::Dataset;
use crate::descriptor::{BinaryHamming, DescriptorKind, RealL2};
use crate::error::{Result, VocabError};

/// Training parameters for a [`VocabTree`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocabTreeParams {
    /// Children per interior node. Must be at least 2.
    pub branching: usize,
    /// Maximum tree depth; leaves live at this level or above. Must be at
    /// least 1.
    pub depth: usize,
    /// Lloyd iteration budget per node. Negative means uncapped, bounded by
    /// [`MAX_LLOYD_ITERATIONS`].
    pub max_iterations: i32,
    /// Seeding strategy for each clustering round.
    pub centers_init: CentersInit,
    /// Seed of the build rng; equal seeds reproduce identical trees.
    pub seed: u64,
}

impl Default for VocabTreeParams {
    fn default() -> Self {
        Self {
            branching: 10,
            depth: 6,
            max_iterations: 10,
            centers_init: CentersInit::Random,
            seed: 0,
        }
    }
}

/// Leaf or interior role of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Interior node with one arena index per child, in child order.
    Interior(Vec<u32>),
    /// Leaf holding its word id.
    Leaf(u32),
}

/// One arena slot; the slot position is the pre-order node id.
#[derive(Debug, Clone)]
pub(crate) struct TreeNode<K: DescriptorKind> {
    pub center: Vec<K::Elem>,
    pub kind: NodeKind,
}

impl<K: DescriptorKind> PartialEq for TreeNode<K> {
    fn eq(&self, other: &Self) -> bool {
        self.center == other.center && self.kind == other.kind
    }
}

/// Result of descending one descriptor through the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantization {
    /// The word (leaf) the descriptor landed in.
    pub word_id: u32,
    /// Index of the child branch taken at the requested level; 0 when the
    /// descent already sat on child 0.
    pub node_at_level: u32,
}

/// Hierarchical quantizer mapping descriptors to visual words.
///
/// Generic over the [`DescriptorKind`]: [`VocabTreeReal`] clusters float
/// descriptors with k-means, [`VocabTreeBin`] clusters packed binary
/// descriptors with k-majority.
#[derive(Debug, Clone)]
pub struct VocabTree<K: DescriptorKind> {
    params: VocabTreeParams,
    veclen: usize,
    nodes: Vec<TreeNode<K>>,
    /// Arena index of every word, in word-id order.
    words: Vec<u32>,
}

/// Vocabulary over real-valued descriptors (hierarchical k-means).
pub type VocabTreeReal = VocabTree<RealL2>;

/// Vocabulary over packed binary descriptors (hierarchical k-majority).
pub type VocabTreeBin = VocabTree<BinaryHamming>;

impl<K: DescriptorKind> VocabTree<K> {
    /// Create an untrained tree. Parameters are validated by [`build`].
    ///
    /// [`build`]: VocabTree::build
    #[must_use]
    pub fn new(params: VocabTreeParams) -> Self {
        Self {
            params,
            veclen: 0,
            nodes: Vec::new(),
            words: Vec::new(),
        }
    }

    /// Train the vocabulary over `data`.
    pub fn build<D: Dataset<K> + ?Sized>(&mut self, data: &D) -> Result<()> {
        self.build_with_observer(data, &mut NullObserver)
    }

    /// Train the vocabulary, reporting progress to `observer`.
    ///
    /// On any failure, including cancellation through the observer, the tree
    /// is left in its previous unbuilt state.
    pub fn build_with_observer<D: Dataset<K> + ?Sized>(
        &mut self,
        data: &D,
        observer: &mut dyn BuildObserver,
    ) -> Result<()> {
        if self.params.branching < 2 {
            return Err(VocabError::InvalidParam(format!(
                "branching factor must be at least 2, got {}",
                self.params.branching
            )));
        }
        if self.params.depth < 1 {
            return Err(VocabError::InvalidParam(format!(
                "depth must be at least 1, got {}",
                self.params.depth
            )));
        }
        if data.is_empty() {
            return Err(VocabError::EmptyDataset);
        }

        let max_iterations = if self.params.max_iterations < 0 {
            MAX_LLOYD_ITERATIONS
        } else {
            self.params.max_iterations as usize
        };

        debug!(
            "building vocabulary: {} descriptors x {}, branching {}, depth {}",
            data.rows(),
            data.cols(),
            self.params.branching,
            self.params.depth
        );

        // The builder grows its own arena; `self` is only touched on
        // success, so a failed or cancelled rebuild keeps the previous tree.
        let builder = TreeBuilder::<K, D>::new(
            data,
            self.params.branching,
            self.params.depth,
            max_iterations,
            self.params.centers_init,
            self.params.seed,
            observer,
        );
        let (nodes, words) = builder.run()?;
        self.nodes = nodes;
        self.words = words;
        self.veclen = data.cols();

        debug!(
            "vocabulary built: {} nodes, {} words",
            self.nodes.len(),
            self.words.len()
        );
        Ok(())
    }

    /// Descend `descriptor` to its word.
    ///
    /// `level` selects the depth whose taken branch index is reported back
    /// for direct-index construction; it must lie in `0..depth()`. Ties
    /// during descent break toward the lowest child index.
    pub fn quantize(&self, descriptor: &[K::Elem], level: usize) -> Result<Quantization> {
        if self.is_empty() {
            return Err(VocabError::TreeEmpty);
        }
        if level >= self.params.depth {
            return Err(VocabError::InvalidParam(format!(
                "level {} outside 0..{}",
                level, self.params.depth
            )));
        }
        if descriptor.len() != self.veclen {
            return Err(VocabError::DimensionMismatch {
                expected: self.veclen,
                actual: descriptor.len(),
            });
        }

        let mut node = &self.nodes[0];
        let mut node_at_level = 0u32;
        let mut current = 0;
        loop {
            let children = match &node.kind {
                NodeKind::Leaf(word) => {
                    return Ok(Quantization {
                        word_id: *word,
                        node_at_level,
                    })
                }
                NodeKind::Interior(children) => children,
            };
            let mut best = 0;
            let mut best_dist =
                K::distance(descriptor, &self.nodes[children[0] as usize].center);
            for (j, &child) in children.iter().enumerate().skip(1) {
                let d = K::distance(descriptor, &self.nodes[child as usize].center);
                if d < best_dist {
                    best = j;
                    best_dist = d;
                }
            }
            if current == level {
                node_at_level = best as u32;
            }
            node = &self.nodes[children[best] as usize];
            current += 1;
        }
    }

    /// Number of words, i.e. leaves.
    #[must_use]
    pub fn size(&self) -> usize {
        self.words.len()
    }

    /// Number of words, i.e. leaves.
    #[must_use]
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Total node count, interior nodes included.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Maximum depth leaves can live at.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.params.depth
    }

    /// Children per interior node.
    #[must_use]
    pub fn branching(&self) -> usize {
        self.params.branching
    }

    /// Lloyd iteration budget the tree was configured with.
    #[must_use]
    pub fn iterations(&self) -> i32 {
        self.params.max_iterations
    }

    /// Descriptor length, 0 until the tree is built or loaded.
    #[must_use]
    pub fn veclen(&self) -> usize {
        self.veclen
    }

    /// True before the tree has been built or loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Training parameters.
    #[must_use]
    pub fn params(&self) -> &VocabTreeParams {
        &self.params
    }

    /// Center of the given word's leaf.
    #[must_use]
    pub fn word_center(&self, word_id: u32) -> Option<&[K::Elem]> {
        let node = *self.words.get(word_id as usize)?;
        Some(&self.nodes[node as usize].center)
    }

    pub(crate) fn from_parts(
        params: VocabTreeParams,
        veclen: usize,
        nodes: Vec<TreeNode<K>>,
        words: Vec<u32>,
    ) -> Self {
        Self {
            params,
            veclen,
            nodes,
            words,
        }
    }
}

/// Structural equality: same geometry parameters, same leaf/interior shape
/// at every position, element-wise equal centers.
///
/// The arena is pre-order and child ids are arena positions, so comparing
/// the arenas compares the recursive structure.
impl<K: DescriptorKind> PartialEq for VocabTree<K> {
    fn eq(&self, other: &Self) -> bool {
        self.veclen == other.veclen
            && self.params.branching == other.params.branching
            && self.params.depth == other.params.depth
            && self.nodes == other.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DenseDataset;

    #[test]
    fn new_tree_is_empty() {
        let tree = VocabTreeReal::new(VocabTreeParams::default());
        assert!(tree.is_empty());
        assert_eq!(tree.num_words(), 0);
        assert_eq!(tree.num_nodes(), 0);
        assert_eq!(tree.veclen(), 0);
    }

    #[test]
    fn quantize_before_build_is_rejected() {
        let tree = VocabTreeReal::new(VocabTreeParams::default());
        assert!(matches!(
            tree.quantize(&[0.0, 0.0], 0),
            Err(VocabError::TreeEmpty)
        ));
    }

    #[test]
    fn quantize_checks_descriptor_length() {
        let data = DenseDataset::<RealL2>::from_rows(&[
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![5.0, 5.0],
        ])
        .unwrap();
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 2,
            depth: 2,
            ..Default::default()
        });
        tree.build(&data).unwrap();
        assert!(matches!(
            tree.quantize(&[0.0, 0.0, 0.0], 0),
            Err(VocabError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn quantize_checks_the_level_range() {
        let data = DenseDataset::<RealL2>::from_rows(&[
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![5.0, 5.0],
        ])
        .unwrap();
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 2,
            depth: 2,
            ..Default::default()
        });
        tree.build(&data).unwrap();
        assert!(tree.quantize(&[0.0, 0.0], 1).is_ok());
        assert!(matches!(
            tree.quantize(&[0.0, 0.0], 2),
            Err(VocabError::InvalidParam(_))
        ));
    }

    #[test]
    fn word_ids_are_contiguous_in_pre_order() {
        let data = DenseDataset::<RealL2>::from_rows(&[
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![10.0, 10.0],
            vec![10.0, 11.0],
            vec![11.0, 10.0],
            vec![11.0, 11.0],
        ])
        .unwrap();
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 2,
            depth: 3,
            ..Default::default()
        });
        tree.build(&data).unwrap();

        // The arena is laid out in pre-order, so leaves must appear with
        // strictly ascending word ids, 0..W with no gaps.
        let leaf_words: Vec<u32> = tree
            .nodes
            .iter()
            .filter_map(|n| match n.kind {
                NodeKind::Leaf(w) => Some(w),
                NodeKind::Interior(_) => None,
            })
            .collect();
        let expected: Vec<u32> = (0..tree.num_words() as u32).collect();
        assert_eq!(leaf_words, expected);

        // The word table points back at the right leaves.
        for (w, &node) in tree.words.iter().enumerate() {
            assert_eq!(tree.nodes[node as usize].kind, NodeKind::Leaf(w as u32));
        }
    }

    #[test]
    fn cancelled_build_rolls_back() {
        struct CancelImmediately;
        impl BuildObserver for CancelImmediately {
            fn cancelled(&self) -> bool {
                true
            }
        }

        let data =
            DenseDataset::<RealL2>::from_rows(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 2,
            depth: 1,
            ..Default::default()
        });
        assert!(matches!(
            tree.build_with_observer(&data, &mut CancelImmediately),
            Err(VocabError::Cancelled)
        ));
        assert!(tree.is_empty());
    }
}
