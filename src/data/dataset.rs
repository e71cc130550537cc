//! Labelled datasets that few-shot tasks are drawn from

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

use crate::{checked_product, checked_sum, ensure_positive, FewShotError, Result};

/// An indexed collection of labelled feature vectors.
pub trait FewShotDataset {
    /// Total number of samples
    fn len(&self) -> usize;

    /// Whether the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of every feature vector
    fn num_features(&self) -> usize;

    /// Class id of the sample at `index`, `None` when out of range
    fn class_of(&self, index: usize) -> Option<usize>;

    /// Feature vector of the sample at `index`, `None` when out of range
    fn features(&self, index: usize) -> Option<Array1<f64>>;

    /// Sorted, de-duplicated class ids
    fn class_ids(&self) -> Vec<usize> {
        self.class_index().into_keys().collect()
    }

    /// Sample indices grouped by class id
    fn class_index(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut index: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.len() {
            if let Some(class_id) = self.class_of(i) {
                index.entry(class_id).or_default().push(i);
            }
        }
        index
    }
}

/// Synthetic dataset whose features encode their own label.
///
/// Sample `i` belongs to class `i % n_classes` and has features
/// `[i, class, class, ...]` with `n_features` copies of the class id, so
/// feature index 1 always equals the label.
#[derive(Debug, Clone)]
pub struct DummyDataset {
    samples_per_class: usize,
    n_classes: usize,
    n_features: usize,
}

impl DummyDataset {
    /// Create a new dummy dataset
    pub fn new(samples_per_class: usize, n_classes: usize, n_features: usize) -> Result<Self> {
        ensure_positive("samples_per_class", samples_per_class)?;
        ensure_positive("n_classes", n_classes)?;
        ensure_positive("n_features", n_features)?;
        checked_product("samples_per_class * n_classes", samples_per_class, n_classes)?;
        checked_sum("n_features + 1", n_features, 1)?;

        Ok(Self {
            samples_per_class,
            n_classes,
            n_features,
        })
    }

    pub fn samples_per_class(&self) -> usize {
        self.samples_per_class
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl FewShotDataset for DummyDataset {
    fn len(&self) -> usize {
        self.samples_per_class * self.n_classes
    }

    fn num_features(&self) -> usize {
        self.n_features + 1
    }

    fn class_of(&self, index: usize) -> Option<usize> {
        (index < self.len()).then(|| index % self.n_classes)
    }

    fn features(&self, index: usize) -> Option<Array1<f64>> {
        let class_id = self.class_of(index)? as f64;
        let mut features = Array1::from_elem(self.num_features(), class_id);
        features[0] = index as f64;
        Some(features)
    }

    fn class_ids(&self) -> Vec<usize> {
        (0..self.n_classes).collect()
    }
}

/// Dataset backed by a feature matrix and one label per row
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    features: Array2<f64>,
    labels: Vec<usize>,
    by_class: BTreeMap<usize, Vec<usize>>,
}

impl LabeledDataset {
    /// Create a dataset from `(n_samples, n_features)` features and labels
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(FewShotError::shape(
                "labels per feature row",
                features.nrows(),
                labels.len(),
            ));
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(i);
        }

        Ok(Self {
            features,
            labels,
            by_class,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl FewShotDataset for LabeledDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn num_features(&self) -> usize {
        self.features.ncols()
    }

    fn class_of(&self, index: usize) -> Option<usize> {
        self.labels.get(index).copied()
    }

    fn features(&self, index: usize) -> Option<Array1<f64>> {
        (index < self.len()).then(|| self.features.row(index).to_owned())
    }

    fn class_index(&self) -> BTreeMap<usize, Vec<usize>> {
        self.by_class.clone()
    }
}
