//! # Few-Shot Networks
//!
//! Building blocks for few-shot classification with Prototypical Networks and
//! Matching Networks.
//!
//! ## Overview
//!
//! A few-shot task (an *n-shot, k-way* episode) contains `k` classes with `n`
//! labelled support examples and `q` query examples per class. Both network
//! families reduce the support set to per-class evidence:
//!
//! - Prototypical Networks average the support embeddings of each class into a
//!   prototype and classify queries by their distance to the prototypes.
//! - Matching Networks attend over every support example and sum the attention
//!   falling on each class.
//!
//! Support and query sets are always laid out **class-major**: the first `n`
//! rows belong to class 0, the next `n` to class 1, and so on.
//! [`data::GroupedBatch`] makes that layout explicit.
//!
//! ## Quick Start
//!
//! ```rust
//! use few_shot_networks::prelude::*;
//! use ndarray::array;
//!
//! // 2-way, 2-shot support set
//! let support = array![[0.0, 0.0], [2.0, 0.0], [10.0, 10.0], [12.0, 10.0]];
//! let prototypes = compute_prototypes(&support, 2, 2).unwrap();
//! assert_eq!(prototypes.row(0).to_vec(), vec![1.0, 0.0]);
//!
//! // One query attending over the four support examples
//! let attention = array![[0.1, 0.2, 0.3, 0.4]];
//! let predictions = matching_net_predictions(&attention, 2, 2, 1).unwrap();
//! assert!((predictions[[0, 1]] - 0.7).abs() < 1e-12);
//! ```
//!
//! ## Modules
//!
//! - `network` - Prototype computation, matching predictions, distances and the CNN encoder
//! - `data` - Datasets, class-major batches and the n-shot task sampler
//! - `training` - Episode evaluation, task labels and configuration
//! - `utils` - Accuracy and loss metrics

pub mod network;
pub mod data;
pub mod training;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    // Network components
    pub use crate::network::{
        compute_prototypes, compute_prototypes_grouped, matching_net_predictions,
        pairwise_distances, softmax_rows, get_few_shot_encoder,
        DistanceMetric, EncoderConfig, FewShotEncoder,
    };

    // Data types
    pub use crate::data::{
        collate, DummyDataset, FewShotDataset, GroupedBatch, LabeledDataset, NShotTaskSampler,
        Task,
    };

    // Training components
    pub use crate::training::{
        create_nshot_task_label, evaluate_matching, evaluate_prototypical, matching_net_episode,
        proto_net_episode, EpisodeKind, EpisodeOutput, EvaluationSummary, FewShotConfig,
    };

    // Utilities
    pub use crate::utils::{categorical_accuracy, log_softmax_rows, nll_loss};

    pub use crate::FewShotError;
}

/// Error types for the crate
#[derive(thiserror::Error, Debug)]
pub enum FewShotError {
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FewShotError {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FewShotError>;

/// Small constant guarding divisions and logarithms
pub const EPSILON: f64 = 1e-8;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reject zero-valued task dimensions with a descriptive error.
pub(crate) fn ensure_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(FewShotError::InvalidParameter(format!(
            "{} must be at least 1",
            name
        )));
    }
    Ok(())
}

/// `a * b` for task dimensions, rejecting products that overflow `usize`.
pub(crate) fn checked_product(expr: &str, a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b).ok_or_else(|| {
        FewShotError::InvalidParameter(format!("{} overflows ({} * {})", expr, a, b))
    })
}

/// `a + b` for task dimensions, rejecting sums that overflow `usize`.
pub(crate) fn checked_sum(expr: &str, a: usize, b: usize) -> Result<usize> {
    a.checked_add(b).ok_or_else(|| {
        FewShotError::InvalidParameter(format!("{} overflows ({} + {})", expr, a, b))
    })
}
