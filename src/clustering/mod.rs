//! Hierarchical clustering: seeding strategies, the recursive k-means /
//! k-majority builder, and the observer hooks it reports through.

pub mod centers;
pub mod observer;

pub(crate) mod hkmeans;

pub use centers::CentersInit;
pub use hkmeans::MAX_LLOYD_ITERATIONS;
pub use observer::{BuildObserver, NullObserver};
