//! Class-major batches and collated tasks

use ndarray::{s, Array2, ArrayView2};

use super::FewShotDataset;
use crate::{checked_product, ensure_positive, FewShotError, Result};

/// Embeddings or features grouped contiguously by class.
///
/// Rows `c * shots .. (c + 1) * shots` belong to class `c`. The row count is
/// checked against `ways * shots` on construction, so downstream reductions can
/// rely on the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedBatch {
    data: Array2<f64>,
    ways: usize,
    shots: usize,
}

impl GroupedBatch {
    /// Wrap `data` as `ways` classes of `shots` rows each
    pub fn new(data: Array2<f64>, ways: usize, shots: usize) -> Result<Self> {
        ensure_positive("ways", ways)?;
        ensure_positive("shots", shots)?;

        let expected = checked_product("ways * shots", ways, shots)?;
        if data.nrows() != expected {
            return Err(FewShotError::shape(
                "grouped batch rows (ways * shots)",
                expected,
                data.nrows(),
            ));
        }

        Ok(Self { data, ways, shots })
    }

    /// Number of classes
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Rows per class
    pub fn shots(&self) -> usize {
        self.shots
    }

    /// Feature dimension
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Rows of a single class
    pub fn class_block(&self, class_idx: usize) -> Option<ArrayView2<'_, f64>> {
        if class_idx >= self.ways {
            return None;
        }
        let start = class_idx * self.shots;
        Some(self.data.slice(s![start..start + self.shots, ..]))
    }

    /// Episode label of every row (`[0; shots] ++ [1; shots] ++ ...`)
    pub fn labels(&self) -> Vec<usize> {
        (0..self.ways)
            .flat_map(|c| std::iter::repeat(c).take(self.shots))
            .collect()
    }
}

/// One sampled n-shot, k-way task with `q` queries per class.
///
/// `x` holds the `n * k` support rows followed by the `q * k` query rows, both
/// class-major in the order of `classes`.
#[derive(Debug, Clone)]
pub struct Task {
    /// Features of support then query samples
    pub x: Array2<f64>,
    /// Dataset class id of every row
    pub y: Vec<usize>,
    /// Dataset class ids in episode order
    pub classes: Vec<usize>,
    /// Support samples per class
    pub n: usize,
    /// Classes in the task
    pub k: usize,
    /// Query samples per class
    pub q: usize,
}

impl Task {
    /// Support rows as a grouped batch
    pub fn support(&self) -> Result<GroupedBatch> {
        let rows = self.n * self.k;
        GroupedBatch::new(self.x.slice(s![..rows, ..]).to_owned(), self.k, self.n)
    }

    /// Query rows as a grouped batch
    pub fn queries(&self) -> Result<GroupedBatch> {
        let rows = self.n * self.k;
        GroupedBatch::new(self.x.slice(s![rows.., ..]).to_owned(), self.k, self.q)
    }

    /// Dataset class ids of the support rows
    pub fn support_labels(&self) -> &[usize] {
        &self.y[..self.n * self.k]
    }

    /// Dataset class ids of the query rows
    pub fn query_labels(&self) -> &[usize] {
        &self.y[self.n * self.k..]
    }
}

/// Stack the samples at `indices` into a feature matrix and label vector.
pub fn collate<D: FewShotDataset + ?Sized>(
    dataset: &D,
    indices: &[usize],
) -> Result<(Array2<f64>, Vec<usize>)> {
    let mut x = Array2::zeros((indices.len(), dataset.num_features()));
    let mut y = Vec::with_capacity(indices.len());

    for (row, &idx) in indices.iter().enumerate() {
        let (features, class_id) = dataset
            .features(idx)
            .zip(dataset.class_of(idx))
            .ok_or_else(|| {
                FewShotError::InvalidParameter(format!(
                    "sample index {} out of range for dataset of {}",
                    idx,
                    dataset.len()
                ))
            })?;

        if features.len() != x.ncols() {
            return Err(FewShotError::shape("sample features", x.ncols(), features.len()));
        }
        x.row_mut(row).assign(&features);
        y.push(class_id);
    }

    Ok((x, y))
}
