//! vocabtree: hierarchical vocabulary-tree image retrieval.
//!
//! Given a corpus of images represented as sets of local feature
//! descriptors — real-valued vectors (SIFT-like) or packed binary
//! bit-vectors (ORB/BRIEF-like) — this crate learns a hierarchical
//! quantizer (the *vocabulary tree*), assigns every descriptor to a leaf
//! *visual word*, aggregates per-image word counts into tf-idf weighted
//! bag-of-words vectors, and ranks database images against a query through
//! an inverted index.
//!
//! # Pipeline
//!
//! 1. **Train** ([`tree`], [`clustering`]): recursive k-means over real
//!    descriptors, or k-majority over binary ones ([`kmajority`]), builds a
//!    complete B-ary tree whose leaves are the vocabulary.
//! 2. **Ingest** ([`index`]): each database image is quantized through the
//!    tree and folded into the inverted index; an optional direct index
//!    records which branch every descriptor took at a fixed level.
//! 3. **Score** ([`index::inverted`]): a query's normalized tf-idf vector
//!    is matched against the committed database under the L1 or L2
//!    bag-of-words metric; only posting lists of shared words are touched.
//!
//! Both the tree and the inverted index persist to gzip-compressed text
//! files and survive repeated train/load/query cycles byte-identically.
//!
//! # Example
//!
//! ```
//! use vocabtree::{DenseDataset, InvertedIndex, NormKind, VocabTreeParams, VocabTreeReal};
//!
//! // Eight 2-d descriptors in two tight clusters.
//! let data = DenseDataset::from_rows(&[
//!     vec![0.0_f32, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0],
//!     vec![10.0, 10.0], vec![10.0, 11.0], vec![11.0, 10.0], vec![11.0, 11.0],
//! ])?;
//!
//! let mut tree = VocabTreeReal::new(VocabTreeParams {
//!     branching: 2,
//!     depth: 2,
//!     ..Default::default()
//! });
//! tree.build(&data)?;
//! assert_eq!(tree.num_words(), 4);
//!
//! let mut index = InvertedIndex::new(NormKind::L1);
//! index.add_image(0, &data, &tree)?;
//! index.commit();
//!
//! let scores = index.score(&data, &tree)?;
//! assert_eq!(vocabtree::ranked(&scores)[0], 0);
//! # Ok::<(), vocabtree::VocabError>(())
//! ```

pub mod clustering;
pub mod dataset;
pub mod descriptor;
pub mod distance;
pub mod error;
pub mod index;
pub mod kmajority;
pub mod tree;

pub use clustering::{BuildObserver, CentersInit, NullObserver};
pub use dataset::{Dataset, DenseDataset};
pub use descriptor::{BinaryHamming, DescriptorKind, RealL2};
pub use error::{Result, VocabError};
pub use index::{ranked, DirectIndex, InvertedIndex, NormKind};
pub use tree::{Quantization, VocabTree, VocabTreeBin, VocabTreeParams, VocabTreeReal};
