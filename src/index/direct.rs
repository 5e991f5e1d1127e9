//! Direct index: per-image registry of descriptors by the branch they took
//! at a fixed tree level.
//!
//! Geometric verification matches features of two images only when they
//! descended the same branch at the configured level, which prunes the
//! candidate pairs from all-against-all to branch-against-branch.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::dataset::Dataset;
use crate::descriptor::DescriptorKind;
use crate::error::{Result, VocabError};
use crate::tree::VocabTree;

/// Descriptor indices filed under one branch; images rarely put more than a
/// handful of features down the same branch.
type FeatureList = SmallVec<[u32; 8]>;

/// Maps, per image, the branch index taken at a fixed level to the
/// descriptors that went down that branch.
#[derive(Debug, Clone, Default)]
pub struct DirectIndex {
    level: usize,
    images: Vec<BTreeMap<u32, FeatureList>>,
}

impl DirectIndex {
    /// Create a direct index recording branches at `level`, which must lie
    /// above the leaves of `tree`.
    pub fn new<K: DescriptorKind>(level: usize, tree: &VocabTree<K>) -> Result<Self> {
        if level >= tree.depth() {
            return Err(VocabError::InvalidParam(format!(
                "level {} outside 0..{}",
                level,
                tree.depth()
            )));
        }
        Ok(Self {
            level,
            images: Vec::new(),
        })
    }

    /// The tree level branches are recorded at.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of images with at least one registered descriptor slot.
    #[must_use]
    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Register descriptor `feature_idx` of `image_id` under the branch
    /// `node_at_level`.
    pub fn insert(&mut self, image_id: u32, node_at_level: u32, feature_idx: u32) {
        let slot = image_id as usize;
        if slot >= self.images.len() {
            self.images.resize_with(slot + 1, BTreeMap::new);
        }
        self.images[slot]
            .entry(node_at_level)
            .or_default()
            .push(feature_idx);
    }

    /// Descriptors of `image_id` that went down branch `node_at_level`.
    #[must_use]
    pub fn lookup(&self, image_id: u32, node_at_level: u32) -> &[u32] {
        self.images
            .get(image_id as usize)
            .and_then(|branches| branches.get(&node_at_level))
            .map_or(&[], SmallVec::as_slice)
    }

    /// Branches of `image_id` that hold at least one descriptor, in
    /// ascending branch order.
    pub fn branches(&self, image_id: u32) -> impl Iterator<Item = u32> + '_ {
        self.images
            .get(image_id as usize)
            .into_iter()
            .flat_map(|branches| branches.keys().copied())
    }

    /// Quantize a whole image and file every descriptor under its branch.
    ///
    /// Nothing is registered unless the whole image quantizes cleanly.
    pub fn add_image<K, D>(
        &mut self,
        image_id: u32,
        descriptors: &D,
        tree: &VocabTree<K>,
    ) -> Result<()>
    where
        K: DescriptorKind,
        D: Dataset<K> + ?Sized,
    {
        let mut staged = Vec::with_capacity(descriptors.rows());
        for i in 0..descriptors.rows() {
            let q = tree.quantize(descriptors.row(i), self.level)?;
            staged.push(q.node_at_level);
        }
        for (i, branch) in staged.into_iter().enumerate() {
            self.insert(image_id, branch, i as u32);
        }
        Ok(())
    }
}
