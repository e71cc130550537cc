//! Multi-episode evaluation over sampled tasks

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{matching_net_episode, proto_net_episode, EpisodeOutput, FewShotConfig};
use crate::data::{collate, FewShotDataset, NShotTaskSampler};
use crate::{FewShotError, Result};

/// Which episode procedure to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeKind {
    Prototypical,
    Matching,
}

/// Aggregate results over evaluated episodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Number of tasks evaluated
    pub episodes: usize,
    /// Mean loss across tasks
    pub mean_loss: f64,
    /// Mean query accuracy across tasks
    pub mean_accuracy: f64,
    /// Per-task accuracy
    pub accuracies: Vec<f64>,
}

impl EvaluationSummary {
    fn push(&mut self, output: &EpisodeOutput) {
        self.episodes += 1;
        // Running means
        let count = self.episodes as f64;
        self.mean_loss += (output.loss - self.mean_loss) / count;
        self.mean_accuracy += (output.accuracy - self.mean_accuracy) / count;
        self.accuracies.push(output.accuracy);
    }
}

/// Sample one epoch of tasks, embed each with `embed` and evaluate it.
///
/// `embed` maps the `(n + q) * k` raw feature rows of a task to embeddings
/// with the same row order.
pub fn evaluate<D, F>(
    dataset: &D,
    config: &FewShotConfig,
    kind: EpisodeKind,
    mut embed: F,
) -> Result<EvaluationSummary>
where
    D: FewShotDataset + ?Sized,
    F: FnMut(&Array2<f64>) -> Result<Array2<f64>>,
{
    config.validate()?;

    let mut sampler = NShotTaskSampler::new(
        dataset,
        config.episodes_per_epoch,
        config.n,
        config.k,
        config.q,
        config.num_tasks,
    )?;
    if let Some(seed) = config.seed {
        sampler = sampler.with_seed(seed);
    }

    let task_size = config.task_size()?;
    let mut summary = EvaluationSummary::default();

    for batch in sampler.epoch() {
        let (x, _) = collate(dataset, &batch)?;

        for task_idx in 0..config.num_tasks {
            let start = task_idx * task_size;
            let task_x = x.slice(s![start..start + task_size, ..]).to_owned();
            let embeddings = embed(&task_x)?;
            if embeddings.nrows() != task_size {
                return Err(FewShotError::shape("embedded task rows", task_size, embeddings.nrows()));
            }

            let output = match kind {
                EpisodeKind::Prototypical => {
                    proto_net_episode(&embeddings, config.n, config.k, config.q, config.distance)?
                }
                EpisodeKind::Matching => {
                    matching_net_episode(&embeddings, config.n, config.k, config.q, config.distance)?
                }
            };
            summary.push(&output);
        }
    }

    info!(
        ?kind,
        n = config.n,
        k = config.k,
        q = config.q,
        episodes = summary.episodes,
        mean_loss = summary.mean_loss,
        mean_accuracy = summary.mean_accuracy,
        "evaluation finished"
    );
    Ok(summary)
}

/// Evaluate prototypical network episodes
pub fn evaluate_prototypical<D, F>(
    dataset: &D,
    config: &FewShotConfig,
    embed: F,
) -> Result<EvaluationSummary>
where
    D: FewShotDataset + ?Sized,
    F: FnMut(&Array2<f64>) -> Result<Array2<f64>>,
{
    evaluate(dataset, config, EpisodeKind::Prototypical, embed)
}

/// Evaluate matching network episodes
pub fn evaluate_matching<D, F>(
    dataset: &D,
    config: &FewShotConfig,
    embed: F,
) -> Result<EvaluationSummary>
where
    D: FewShotDataset + ?Sized,
    F: FnMut(&Array2<f64>) -> Result<Array2<f64>>,
{
    evaluate(dataset, config, EpisodeKind::Matching, embed)
}
