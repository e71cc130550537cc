//! Loss and predictions for a single few-shot episode
//!
//! Both functions take the embeddings of one task laid out as `n * k` support
//! rows followed by `q * k` query rows, each block class-major.

use ndarray::{s, Array2};
use tracing::debug;

use super::create_nshot_task_label;
use crate::network::{
    compute_prototypes, matching_net_predictions, pairwise_distances, softmax_rows, DistanceMetric,
};
use crate::utils::{categorical_accuracy, log_softmax_rows, nll_loss};
use crate::{checked_product, checked_sum, ensure_positive, FewShotError, Result, EPSILON};

/// Result of evaluating one episode
#[derive(Debug, Clone)]
pub struct EpisodeOutput {
    /// Mean negative log-likelihood over the queries
    pub loss: f64,
    /// Class probabilities per query, shape (q * k, k)
    pub y_pred: Array2<f64>,
    /// Fraction of queries classified correctly
    pub accuracy: f64,
}

/// Split task embeddings into support and query matrices
fn split_task(
    embeddings: &Array2<f64>,
    n: usize,
    k: usize,
    q: usize,
) -> Result<(Array2<f64>, Array2<f64>)> {
    ensure_positive("n", n)?;
    ensure_positive("k", k)?;
    ensure_positive("q", q)?;

    let support_rows = checked_product("n * k", n, k)?;
    let expected = checked_product("(n + q) * k", checked_sum("n + q", n, q)?, k)?;
    if embeddings.nrows() != expected {
        return Err(FewShotError::shape(
            "task embeddings ((n + q) * k)",
            expected,
            embeddings.nrows(),
        ));
    }

    let support = embeddings.slice(s![..support_rows, ..]).to_owned();
    let queries = embeddings.slice(s![support_rows.., ..]).to_owned();
    Ok((support, queries))
}

/// Prototypical network episode.
///
/// Queries are scored by the negative distance to each class prototype;
/// `y_pred` is the softmax of those scores and the loss is the NLL of the
/// log-softmax against the episode labels.
pub fn proto_net_episode(
    embeddings: &Array2<f64>,
    n: usize,
    k: usize,
    q: usize,
    distance: DistanceMetric,
) -> Result<EpisodeOutput> {
    let (support, queries) = split_task(embeddings, n, k, q)?;

    let prototypes = compute_prototypes(&support, k, n)?;
    let distances = pairwise_distances(&queries, &prototypes, distance)?;
    let logits = distances.mapv(|d| -d);

    let y = create_nshot_task_label(k, q);
    let loss = nll_loss(&log_softmax_rows(&logits), &y)?;
    let y_pred = softmax_rows(&logits);
    let accuracy = categorical_accuracy(&y, &y_pred)?;

    debug!(n, k, q, %distance, loss, accuracy, "prototypical episode");
    Ok(EpisodeOutput {
        loss,
        y_pred,
        accuracy,
    })
}

/// Matching network episode.
///
/// Attention is the softmax of negative query-to-support distances. Predictions
/// are clipped to `[EPSILON, 1 - EPSILON]` before taking the log for the loss.
pub fn matching_net_episode(
    embeddings: &Array2<f64>,
    n: usize,
    k: usize,
    q: usize,
    distance: DistanceMetric,
) -> Result<EpisodeOutput> {
    let (support, queries) = split_task(embeddings, n, k, q)?;

    let distances = pairwise_distances(&queries, &support, distance)?;
    let attention = softmax_rows(&distances.mapv(|d| -d));
    let y_pred = matching_net_predictions(&attention, n, k, q)?;

    let y = create_nshot_task_label(k, q);
    let log_probs = y_pred.mapv(|p| p.clamp(EPSILON, 1.0 - EPSILON).ln());
    let loss = nll_loss(&log_probs, &y)?;
    let accuracy = categorical_accuracy(&y, &y_pred)?;

    debug!(n, k, q, %distance, loss, accuracy, "matching episode");
    Ok(EpisodeOutput {
        loss,
        y_pred,
        accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Axis};

    /// 2-way task with well separated classes, support then queries
    fn separated_task(n: usize, q: usize) -> Array2<f64> {
        let k = 2;
        let mut rows = Vec::new();
        for count in [n, q] {
            for class_idx in 0..k {
                for i in 0..count {
                    let center = class_idx as f64 * 10.0;
                    rows.push(vec![center + i as f64 * 0.1, center - i as f64 * 0.1]);
                }
            }
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec(((n + q) * k, 2), flat).unwrap()
    }

    #[test]
    fn test_proto_episode_separable() {
        let embeddings = separated_task(3, 2);

        let output = proto_net_episode(&embeddings, 3, 2, 2, DistanceMetric::L2).unwrap();

        assert_eq!(output.y_pred.dim(), (4, 2));
        assert_relative_eq!(output.accuracy, 1.0);
        assert!(output.loss < 1e-6);
        for row in output.y_pred.axis_iter(Axis(0)) {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_proto_episode_uniform_when_prototypes_coincide() {
        let embeddings = Array2::from_elem((4, 3), 1.0);

        let output = proto_net_episode(&embeddings, 1, 2, 1, DistanceMetric::L2).unwrap();

        assert_relative_eq!(output.loss, 2.0f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(output.y_pred[[0, 0]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_matching_episode_separable() {
        let embeddings = separated_task(2, 3);

        let output = matching_net_episode(&embeddings, 2, 2, 3, DistanceMetric::L2).unwrap();

        assert_eq!(output.y_pred.dim(), (6, 2));
        assert_relative_eq!(output.accuracy, 1.0);
        for row in output.y_pred.axis_iter(Axis(0)) {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_matching_loss_is_clipped() {
        // Perfect predictions still give a finite loss
        let embeddings = array![[0.0, 0.0], [100.0, 100.0], [0.0, 0.0], [100.0, 100.0]];

        let output = matching_net_episode(&embeddings, 1, 2, 1, DistanceMetric::L2).unwrap();

        assert!(output.loss.is_finite());
        assert!(output.loss >= 0.0);
    }

    #[test]
    fn test_episode_row_count_checked() {
        let embeddings = Array2::zeros((7, 2));

        assert!(matches!(
            proto_net_episode(&embeddings, 1, 2, 3, DistanceMetric::Cosine),
            Err(FewShotError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            matching_net_episode(&embeddings, 1, 2, 3, DistanceMetric::Dot),
            Err(FewShotError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_overflowing_task_dimensions_rejected() {
        let embeddings = Array2::zeros((4, 2));

        assert!(matches!(
            proto_net_episode(&embeddings, usize::MAX, 2, 1, DistanceMetric::L2),
            Err(FewShotError::InvalidParameter(_))
        ));
        assert!(matches!(
            matching_net_episode(&embeddings, 1, 2, usize::MAX, DistanceMetric::L2),
            Err(FewShotError::InvalidParameter(_))
        ));
    }
}
