//! n-shot, k-way task sampling
//!
//! Each sampled task lists the `n` support indices of every chosen class
//! (class-major), followed by `q` query indices per class in the same class
//! order. Queries never repeat a support sample of the same task.

use std::collections::{BTreeMap, HashSet};

use rand::prelude::*;
use tracing::debug;

use super::{collate, FewShotDataset, Task};
use crate::{checked_product, checked_sum, ensure_positive, FewShotError, Result};

/// Draws batches of few-shot tasks from a dataset
pub struct NShotTaskSampler<'a, D: FewShotDataset + ?Sized> {
    dataset: &'a D,
    episodes_per_epoch: usize,
    n: usize,
    k: usize,
    q: usize,
    num_tasks: usize,
    batch_size: usize,
    /// Classes with at least `n + q` samples, with their sample indices
    eligible: BTreeMap<usize, Vec<usize>>,
    fixed_tasks: Option<Vec<Vec<usize>>>,
    fixed_cursor: usize,
    rng: StdRng,
}

impl<'a, D: FewShotDataset + ?Sized> NShotTaskSampler<'a, D> {
    /// Create a new sampler
    ///
    /// # Arguments
    /// * `dataset` - Source of labelled samples
    /// * `episodes_per_epoch` - Batches yielded by one epoch
    /// * `n` - Support samples per class
    /// * `k` - Classes per task
    /// * `q` - Query samples per class
    /// * `num_tasks` - Tasks concatenated into each batch
    pub fn new(
        dataset: &'a D,
        episodes_per_epoch: usize,
        n: usize,
        k: usize,
        q: usize,
        num_tasks: usize,
    ) -> Result<Self> {
        ensure_positive("n", n)?;
        ensure_positive("k", k)?;
        ensure_positive("q", q)?;
        ensure_positive("num_tasks", num_tasks)?;

        let per_class = checked_sum("n + q", n, q)?;
        let task_size = checked_product("(n + q) * k", per_class, k)?;
        let batch_size = checked_product("num_tasks * (n + q) * k", num_tasks, task_size)?;

        let mut eligible = dataset.class_index();
        let total_classes = eligible.len();
        eligible.retain(|_, indices| indices.len() >= per_class);

        if eligible.len() < k {
            return Err(FewShotError::InsufficientData(format!(
                "{} of {} classes have at least {} samples, need {} classes",
                eligible.len(),
                total_classes,
                per_class,
                k
            )));
        }

        debug!(
            n,
            k,
            q,
            num_tasks,
            eligible_classes = eligible.len(),
            "created n-shot task sampler"
        );

        Ok(Self {
            dataset,
            episodes_per_epoch,
            n,
            k,
            q,
            num_tasks,
            batch_size,
            eligible,
            fixed_tasks: None,
            fixed_cursor: 0,
            rng: StdRng::from_entropy(),
        })
    }

    /// Use a fixed seed for reproducible tasks
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Cycle through a fixed list of class sets instead of random classes
    pub fn with_fixed_tasks(mut self, tasks: Vec<Vec<usize>>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(FewShotError::InvalidParameter(
                "fixed task list is empty".to_string(),
            ));
        }

        for classes in &tasks {
            let distinct: HashSet<_> = classes.iter().collect();
            if classes.len() != self.k || distinct.len() != self.k {
                return Err(FewShotError::InvalidParameter(format!(
                    "fixed task {:?} must name {} distinct classes",
                    classes, self.k
                )));
            }
            if let Some(missing) = classes.iter().find(|c| !self.eligible.contains_key(*c)) {
                return Err(FewShotError::InsufficientData(format!(
                    "class {} has fewer than {} samples",
                    missing,
                    self.n + self.q
                )));
            }
        }

        self.fixed_tasks = Some(tasks);
        self.fixed_cursor = 0;
        Ok(self)
    }

    /// Number of batches per epoch
    pub fn episodes_per_epoch(&self) -> usize {
        self.episodes_per_epoch
    }

    /// Rows in every batch: `num_tasks * (n + q) * k`
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn choose_classes(&mut self) -> Vec<usize> {
        if let Some(tasks) = &self.fixed_tasks {
            let classes = tasks[self.fixed_cursor % tasks.len()].clone();
            self.fixed_cursor += 1;
            return classes;
        }

        let available: Vec<usize> = self.eligible.keys().copied().collect();
        available
            .choose_multiple(&mut self.rng, self.k)
            .copied()
            .collect()
    }

    /// Sample indices of a single task and the classes it covers
    fn sample_task_indices(&mut self) -> (Vec<usize>, Vec<usize>) {
        let classes = self.choose_classes();
        let mut support = Vec::with_capacity(self.n * self.k);
        let mut queries = Vec::with_capacity(self.q * self.k);
        let mut used: HashSet<usize> = HashSet::with_capacity(self.n * self.k);

        for class_id in &classes {
            let pool = &self.eligible[class_id];
            for &idx in pool.choose_multiple(&mut self.rng, self.n) {
                support.push(idx);
                used.insert(idx);
            }
        }

        for class_id in &classes {
            let candidates: Vec<usize> = self.eligible[class_id]
                .iter()
                .copied()
                .filter(|idx| !used.contains(idx))
                .collect();
            queries.extend(candidates.choose_multiple(&mut self.rng, self.q).copied());
        }

        support.extend(queries);
        (support, classes)
    }

    /// Indices of one batch of `num_tasks` concatenated tasks
    pub fn sample_batch(&mut self) -> Vec<usize> {
        let mut batch = Vec::with_capacity(self.batch_size());
        for _ in 0..self.num_tasks {
            let (indices, classes) = self.sample_task_indices();
            debug!(?classes, "sampled task");
            batch.extend(indices);
        }
        batch
    }

    /// Sample and collate a single task
    pub fn sample_task(&mut self) -> Result<Task> {
        let (indices, classes) = self.sample_task_indices();
        let (x, y) = collate(self.dataset, &indices)?;

        Ok(Task {
            x,
            y,
            classes,
            n: self.n,
            k: self.k,
            q: self.q,
        })
    }

    /// Iterate over one epoch of index batches
    pub fn epoch(&mut self) -> EpochIterator<'_, 'a, D> {
        EpochIterator {
            remaining: self.episodes_per_epoch,
            sampler: self,
        }
    }
}

/// Iterator over the index batches of one epoch
pub struct EpochIterator<'s, 'a, D: FewShotDataset + ?Sized> {
    sampler: &'s mut NShotTaskSampler<'a, D>,
    remaining: usize,
}

impl<'s, 'a, D: FewShotDataset + ?Sized> Iterator for EpochIterator<'s, 'a, D> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.sampler.sample_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DummyDataset, LabeledDataset};
    use ndarray::Array2;

    #[test]
    fn test_batch_layout() {
        let dataset = DummyDataset::new(50, 10, 1).unwrap();
        let (n, k, q) = (3, 4, 2);
        let mut sampler = NShotTaskSampler::new(&dataset, 5, n, k, q, 1)
            .unwrap()
            .with_seed(42);

        let batch = sampler.sample_batch();
        assert_eq!(batch.len(), (n + q) * k);

        let labels: Vec<usize> = batch.iter().map(|&i| dataset.class_of(i).unwrap()).collect();
        // Support is class-major
        for c in 0..k {
            let block = &labels[c * n..(c + 1) * n];
            assert!(block.iter().all(|&l| l == block[0]));
        }
        // Queries follow the support class order
        for c in 0..k {
            let start = n * k + c * q;
            assert!(labels[start..start + q].iter().all(|&l| l == labels[c * n]));
        }
    }

    #[test]
    fn test_support_and_queries_disjoint() {
        let dataset = DummyDataset::new(6, 5, 1).unwrap();
        let (n, k, q) = (3, 5, 3);
        let mut sampler = NShotTaskSampler::new(&dataset, 1, n, k, q, 1)
            .unwrap()
            .with_seed(1);

        let batch = sampler.sample_batch();
        let distinct: HashSet<_> = batch.iter().collect();

        assert_eq!(distinct.len(), batch.len());
    }

    #[test]
    fn test_epoch_length() {
        let dataset = DummyDataset::new(20, 5, 1).unwrap();
        let mut sampler = NShotTaskSampler::new(&dataset, 7, 1, 5, 2, 2)
            .unwrap()
            .with_seed(3);

        let batches: Vec<_> = sampler.epoch().collect();

        assert_eq!(batches.len(), 7);
        assert!(batches.iter().all(|b| b.len() == 2 * 3 * 5));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let dataset = DummyDataset::new(30, 8, 1).unwrap();

        let mut a = NShotTaskSampler::new(&dataset, 3, 2, 4, 2, 1).unwrap().with_seed(9);
        let mut b = NShotTaskSampler::new(&dataset, 3, 2, 4, 2, 1).unwrap().with_seed(9);

        let from_a: Vec<_> = a.epoch().collect();
        let from_b: Vec<_> = b.epoch().collect();
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn test_fixed_tasks_cycle() {
        let dataset = DummyDataset::new(10, 6, 1).unwrap();
        let mut sampler = NShotTaskSampler::new(&dataset, 4, 1, 2, 1, 1)
            .unwrap()
            .with_fixed_tasks(vec![vec![5, 0], vec![2, 3]])
            .unwrap();

        let first = sampler.sample_task().unwrap();
        let second = sampler.sample_task().unwrap();
        let third = sampler.sample_task().unwrap();

        assert_eq!(first.classes, vec![5, 0]);
        assert_eq!(first.support_labels(), &[5, 0]);
        assert_eq!(second.classes, vec![2, 3]);
        assert_eq!(third.classes, vec![5, 0]);
    }

    #[test]
    fn test_fixed_tasks_validation() {
        let dataset = DummyDataset::new(10, 6, 1).unwrap();

        let wrong_size = NShotTaskSampler::new(&dataset, 1, 1, 2, 1, 1)
            .unwrap()
            .with_fixed_tasks(vec![vec![1, 2, 3]]);
        assert!(wrong_size.is_err());

        let unknown = NShotTaskSampler::new(&dataset, 1, 1, 2, 1, 1)
            .unwrap()
            .with_fixed_tasks(vec![vec![1, 17]]);
        assert!(matches!(unknown, Err(FewShotError::InsufficientData(_))));
    }

    #[test]
    fn test_insufficient_classes() {
        let dataset = DummyDataset::new(100, 4, 1).unwrap();

        let result = NShotTaskSampler::new(&dataset, 1, 1, 5, 1, 1);
        assert!(matches!(result, Err(FewShotError::InsufficientData(_))));
    }

    #[test]
    fn test_small_classes_excluded() {
        // Class 2 only has one sample
        let labels = vec![0, 0, 0, 1, 1, 1, 2];
        let dataset = LabeledDataset::new(Array2::zeros((7, 3)), labels).unwrap();

        let mut sampler = NShotTaskSampler::new(&dataset, 10, 2, 2, 1, 1)
            .unwrap()
            .with_seed(0);
        for _ in 0..10 {
            let task = sampler.sample_task().unwrap();
            assert!(!task.classes.contains(&2));
        }

        assert!(NShotTaskSampler::new(&dataset, 1, 2, 3, 1, 1).is_err());
    }

    #[test]
    fn test_zero_shot_rejected() {
        let dataset = DummyDataset::new(10, 5, 1).unwrap();
        assert!(matches!(
            NShotTaskSampler::new(&dataset, 1, 0, 5, 1, 1),
            Err(FewShotError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_overflowing_task_dimensions_rejected() {
        let dataset = DummyDataset::new(10, 5, 1).unwrap();
        assert!(matches!(
            NShotTaskSampler::new(&dataset, 1, usize::MAX, 2, 1, 1),
            Err(FewShotError::InvalidParameter(_))
        ));
        assert!(matches!(
            NShotTaskSampler::new(&dataset, 1, 1, 2, 1, usize::MAX),
            Err(FewShotError::InvalidParameter(_))
        ));
    }
}
