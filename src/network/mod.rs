//! Neural network components for few-shot classification
//!
//! This module provides:
//! - Prototype computation from class-major support set embeddings
//! - Matching network class predictions from attention matrices
//! - Pairwise distance functions and row softmax
//! - The convolutional embedding encoder

mod prototype;
mod matching;
mod distance;
mod encoder;

pub use prototype::{compute_prototypes, compute_prototypes_grouped};
pub use matching::{matching_net_predictions, ROW_SUM_TOLERANCE};
pub use distance::{pairwise_distances, softmax_rows, DistanceMetric};
pub use encoder::{get_few_shot_encoder, ConvBlock, EncoderConfig, FewShotEncoder};
