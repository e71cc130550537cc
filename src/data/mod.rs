//! Data sources and task sampling for few-shot episodes
//!
//! This module provides:
//! - The `FewShotDataset` trait with an in-memory and a synthetic implementation
//! - `GroupedBatch`, a class-major batch with validated grouping
//! - `NShotTaskSampler` for drawing n-shot, k-way, q-query tasks

mod dataset;
mod batch;
mod sampler;

pub use dataset::{DummyDataset, FewShotDataset, LabeledDataset};
pub use batch::{collate, GroupedBatch, Task};
pub use sampler::{EpochIterator, NShotTaskSampler};
