//! Image databases over a trained vocabulary: the tf-idf inverted index
//! with its scoring engine, and the direct index used for constrained
//! feature matching.

pub mod direct;
pub mod inverted;

mod io;

pub use direct::DirectIndex;
pub use inverted::{ranked, InvertedIndex, NormKind, Posting};
