//! Episode evaluation for few-shot networks
//!
//! This module provides:
//! - Episode labels for class-major query sets
//! - Prototypical and matching network episode losses and predictions
//! - Configuration and multi-episode evaluation

mod config;
mod labels;
mod episode;
mod evaluate;

pub use config::FewShotConfig;
pub use labels::create_nshot_task_label;
pub use episode::{matching_net_episode, proto_net_episode, EpisodeOutput};
pub use evaluate::{evaluate, evaluate_matching, evaluate_prototypical, EpisodeKind, EvaluationSummary};
