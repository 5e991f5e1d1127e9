//! Descriptor datasets: the read-only matrices that training, ingest and
//! scoring consume.

use std::marker::PhantomData;

use crate::descriptor::DescriptorKind;
use crate::error::{Result, VocabError};

/// A read-only matrix of `rows()` descriptors with `cols()` elements each.
///
/// Rows are immutable while a tree is being built over them. Implementations
/// may page rows in from slower storage; the clusterer relies only on
/// bounded random access.
pub trait Dataset<K: DescriptorKind> {
    /// Number of descriptors.
    fn rows(&self) -> usize;

    /// Elements per descriptor.
    fn cols(&self) -> usize;

    /// Borrow descriptor `i`.
    fn row(&self, i: usize) -> &[K::Elem];

    fn is_empty(&self) -> bool {
        self.rows() == 0
    }
}

/// In-memory dataset over flat row-major storage.
#[derive(Debug, Clone)]
pub struct DenseDataset<K: DescriptorKind> {
    data: Vec<K::Elem>,
    cols: usize,
    _kind: PhantomData<K>,
}

impl<K: DescriptorKind> DenseDataset<K> {
    /// Wrap flat row-major storage; `data.len()` must divide into rows of
    /// `cols` elements.
    pub fn new(data: Vec<K::Elem>, cols: usize) -> Result<Self> {
        if cols == 0 && !data.is_empty() {
            return Err(VocabError::InvalidParam(
                "descriptor length must be positive".to_string(),
            ));
        }
        if cols != 0 && data.len() % cols != 0 {
            return Err(VocabError::InvalidParam(format!(
                "flat storage of {} elements does not split into rows of {}",
                data.len(),
                cols
            )));
        }
        Ok(Self {
            data,
            cols,
            _kind: PhantomData,
        })
    }

    /// Collect per-row storage into a dataset. Rows must share one length.
    pub fn from_rows(rows: &[Vec<K::Elem>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(VocabError::DimensionMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(data, cols)
    }
}

impl<K: DescriptorKind> Dataset<K> for DenseDataset<K> {
    fn rows(&self) -> usize {
        if self.cols == 0 {
            0
        } else {
            self.data.len() / self.cols
        }
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn row(&self, i: usize) -> &[K::Elem] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BinaryHamming, RealL2};

    #[test]
    fn flat_storage_splits_into_rows() {
        let ds = DenseDataset::<RealL2>::new(vec![0.0, 1.0, 2.0, 3.0], 2).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.cols(), 2);
        assert_eq!(ds.row(1), &[2.0, 3.0]);
    }

    #[test]
    fn ragged_storage_is_rejected() {
        assert!(DenseDataset::<RealL2>::new(vec![0.0; 5], 2).is_err());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = vec![vec![1u8, 2], vec![3u8]];
        assert!(matches!(
            DenseDataset::<BinaryHamming>::from_rows(&rows),
            Err(VocabError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn empty_dataset_is_constructible() {
        let ds = DenseDataset::<BinaryHamming>::from_rows(&[]).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.rows(), 0);
    }
}
