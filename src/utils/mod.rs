//! Utility functions and metrics
//!
//! This module provides:
//! - Classification accuracy
//! - Log-softmax and negative log-likelihood loss

mod metrics;

pub use metrics::{categorical_accuracy, log_softmax_rows, nll_loss};
