//! Inverted index and bag-of-words scoring.
//!
//! Ingest quantizes every descriptor of an image into its word, accumulates
//! the image's sparse term-frequency vector and appends one posting per
//! distinct word. [`InvertedIndex::commit`] freezes a snapshot for scoring:
//! it derives idf from the document frequencies and the norm of every
//! image's tf-idf vector. Scoring walks only the posting lists of the words
//! present in the query, so its cost scales with the query's vocabulary
//! overlap rather than the database size.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::descriptor::DescriptorKind;
use crate::error::{Result, VocabError};
use crate::tree::VocabTree;

/// Vector norm applied to weighted bag-of-words vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    /// Manhattan normalization; similarity accumulates
    /// `|q| + |v| - |q - v|` per shared word.
    L1,
    /// Euclidean normalization; similarity accumulates the dot product.
    L2,
}

impl NormKind {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            NormKind::L1 => "L1",
            NormKind::L2 => "L2",
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "L1" => Ok(NormKind::L1),
            "L2" => Ok(NormKind::L2),
            other => Err(VocabError::NotSupported(format!(
                "unknown norm kind `{other}`"
            ))),
        }
    }
}

/// One posting: an image and the term frequency of the word in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub image_id: u32,
    pub tf: u32,
}

/// Per-image record: the sparse tf pairs and the norm of the weighted
/// vector as of the last commit.
#[derive(Debug, Clone, Default)]
pub(crate) struct ImageRecord {
    /// `(word, tf)` sorted by word.
    pub pairs: Vec<(u32, u32)>,
    pub norm: f32,
}

/// Word-to-postings index with tf-idf weighting over a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    pub(crate) norm_kind: NormKind,
    /// Vocabulary size; 0 until the first image fixes it.
    pub(crate) num_words: usize,
    pub(crate) postings: Vec<Vec<Posting>>,
    pub(crate) df: Vec<u32>,
    pub(crate) images: Vec<ImageRecord>,
    /// Derived at commit; empty before the first commit.
    pub(crate) idf: Vec<f32>,
    /// Scoring sees only images below this bound.
    pub(crate) committed_images: usize,
}

impl InvertedIndex {
    /// Create an empty index normalizing bag-of-words vectors with `norm`.
    #[must_use]
    pub fn new(norm: NormKind) -> Self {
        Self {
            norm_kind: norm,
            num_words: 0,
            postings: Vec::new(),
            df: Vec::new(),
            images: Vec::new(),
            idf: Vec::new(),
            committed_images: 0,
        }
    }

    /// Quantize `descriptors` through `tree` and append the image.
    ///
    /// Image ids are dense and append-only: `image_id` must equal
    /// [`InvertedIndex::db_size`]. The index is only touched once the whole
    /// image quantized cleanly, so a failed ingest adds nothing.
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
        if image_id as usize != self.images.len() {
            return Err(VocabError::InvalidParam(format!(
                "image ids are dense: expected {}, got {image_id}",
                self.images.len()
            )));
        }
        if tree.is_empty() {
            return Err(VocabError::TreeEmpty);
        }
        self.bind_vocabulary(tree.num_words())?;

        // Stage the sparse tf vector first.
        let mut tf: BTreeMap<u32, u32> = BTreeMap::new();
        for i in 0..descriptors.rows() {
            let q = tree.quantize(descriptors.row(i), 0)?;
            *tf.entry(q.word_id).or_insert(0) += 1;
        }

        for (&word, &count) in &tf {
            self.postings[word as usize].push(Posting {
                image_id,
                tf: count,
            });
            self.df[word as usize] += 1;
        }
        debug!("image {image_id}: {} descriptors, {} distinct words", descriptors.rows(), tf.len());
        self.images.push(ImageRecord {
            pairs: tf.into_iter().collect(),
            norm: 0.0,
        });
        Ok(())
    }

    /// Freeze the current database for scoring.
    ///
    /// Computes `idf_w = ln(N_db / df_w)` for every word (0 where `df_w` is
    /// 0) and the norm of every image's weighted vector. Images ingested
    /// after this call stay invisible to [`InvertedIndex::score`] until the
    /// next commit.
    pub fn commit(&mut self) {
        self.idf = self.fresh_idf();
        for i in 0..self.images.len() {
            let norm = self.weighted_norm(&self.images[i], &self.idf);
            self.images[i].norm = norm;
        }
        self.committed_images = self.images.len();
        debug!(
            "committed {} images over {} words",
            self.committed_images, self.num_words
        );
    }

    /// Score a query image against the committed database.
    ///
    /// Returns one similarity per committed image, higher is more similar;
    /// images sharing no word with the query score 0. An empty database
    /// yields an empty vector, an empty query all zeros.
    pub fn score<K, D>(&self, query: &D, tree: &VocabTree<K>) -> Result<Vec<f32>>
    where
        K: DescriptorKind,
        D: Dataset<K> + ?Sized,
    {
        if tree.is_empty() {
            return Err(VocabError::TreeEmpty);
        }
        if self.num_words != 0 && tree.num_words() != self.num_words {
            return Err(VocabError::DimensionMismatch {
                expected: self.num_words,
                actual: tree.num_words(),
            });
        }

        let n = self.committed_images;
        let mut scores = vec![0.0f32; n];
        if n == 0 {
            return Ok(scores);
        }

        let mut tf: BTreeMap<u32, u32> = BTreeMap::new();
        for i in 0..query.rows() {
            let q = tree.quantize(query.row(i), 0)?;
            *tf.entry(q.word_id).or_insert(0) += 1;
        }

        // Weighted query vector under the database idf; words unseen in the
        // database carry zero weight and drop out here.
        let mut q: Vec<(u32, f32)> = tf
            .iter()
            .filter_map(|(&word, &count)| {
                let idf = self.idf[word as usize];
                (idf > 0.0).then(|| (word, count as f32 * idf))
            })
            .collect();
        let norm: f64 = match self.norm_kind {
            NormKind::L1 => q.iter().map(|&(_, w)| f64::from(w.abs())).sum(),
            NormKind::L2 => q
                .iter()
                .map(|&(_, w)| f64::from(w) * f64::from(w))
                .sum::<f64>()
                .sqrt(),
        };
        if norm <= 0.0 {
            return Ok(scores);
        }
        for (_, w) in &mut q {
            *w = (f64::from(*w) / norm) as f32;
        }

        for &(word, qw) in &q {
            let idf = self.idf[word as usize];
            for posting in &self.postings[word as usize] {
                // Postings are appended in image order; everything past the
                // committed bound belongs to a later snapshot.
                if posting.image_id as usize >= n {
                    break;
                }
                let record = &self.images[posting.image_id as usize];
                if record.norm <= 0.0 {
                    continue;
                }
                let dw = posting.tf as f32 * idf / record.norm;
                scores[posting.image_id as usize] += match self.norm_kind {
                    NormKind::L1 => qw.abs() + dw.abs() - (qw - dw).abs(),
                    NormKind::L2 => qw * dw,
                };
            }
        }
        Ok(scores)
    }

    /// Number of ingested images, committed or not.
    #[must_use]
    pub fn db_size(&self) -> usize {
        self.images.len()
    }

    /// Number of images visible to scoring.
    #[must_use]
    pub fn committed_size(&self) -> usize {
        self.committed_images
    }

    /// Norm kind applied to bag-of-words vectors.
    #[must_use]
    pub fn norm_kind(&self) -> NormKind {
        self.norm_kind
    }

    /// Switch the norm kind; stored norms follow at the next commit.
    pub fn set_norm_kind(&mut self, norm: NormKind) {
        self.norm_kind = norm;
    }

    /// Vocabulary size the index is bound to; 0 before the first image.
    #[must_use]
    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Document frequency of `word`.
    #[must_use]
    pub fn df(&self, word: u32) -> u32 {
        self.df.get(word as usize).copied().unwrap_or(0)
    }

    /// Inverse document frequency of `word` as of the last commit.
    #[must_use]
    pub fn idf(&self, word: u32) -> f32 {
        self.idf.get(word as usize).copied().unwrap_or(0.0)
    }

    /// Posting list of `word`.
    #[must_use]
    pub fn posting_list(&self, word: u32) -> &[Posting] {
        self.postings
            .get(word as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// idf of every word from the current df and database size.
    pub(crate) fn fresh_idf(&self) -> Vec<f32> {
        let n_db = self.images.len();
        self.df
            .iter()
            .map(|&df| {
                if df == 0 {
                    0.0
                } else {
                    (n_db as f32 / df as f32).ln()
                }
            })
            .collect()
    }

    /// Norm of one image's tf-idf vector under the index's norm kind.
    pub(crate) fn weighted_norm(&self, record: &ImageRecord, idf: &[f32]) -> f32 {
        let mut acc = 0.0f64;
        for &(word, tf) in &record.pairs {
            let w = f64::from(tf) * f64::from(idf[word as usize]);
            match self.norm_kind {
                NormKind::L1 => acc += w.abs(),
                NormKind::L2 => acc += w * w,
            }
        }
        match self.norm_kind {
            NormKind::L1 => acc as f32,
            NormKind::L2 => acc.sqrt() as f32,
        }
    }

    /// Fix the vocabulary size on first contact, reject mismatches later.
    fn bind_vocabulary(&mut self, num_words: usize) -> Result<()> {
        if self.num_words == 0 && self.images.is_empty() {
            self.num_words = num_words;
            self.postings = vec![Vec::new(); num_words];
            self.df = vec![0; num_words];
            return Ok(());
        }
        if num_words != self.num_words {
            return Err(VocabError::DimensionMismatch {
                expected: self.num_words,
                actual: num_words,
            });
        }
        Ok(())
    }
}

/// Permutation of image ids by descending score; ties break toward the
/// lower id.
#[must_use]
pub fn ranked(scores: &[f32]) -> Vec<u32> {
    let mut perm: Vec<u32> = (0..scores.len() as u32).collect();
    perm.sort_unstable_by(|&a, &b| {
        scores[b as usize]
            .total_cmp(&scores[a as usize])
            .then(a.cmp(&b))
    });
    perm
}
