//! Distance functions between query and support embeddings

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{FewShotError, Result, EPSILON};

/// Distance metric used to compare embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance: sum((x-y)^2)
    L2,
    /// Cosine distance: 1 - (x·y)/(||x|| ||y||)
    Cosine,
    /// Negative dot product: -(x·y)
    Dot,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::L2
    }
}

impl DistanceMetric {
    /// Compute the distance between two vectors
    pub fn compute(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceMetric::L2 => Self::squared_euclidean(a, b),
            DistanceMetric::Cosine => Self::cosine(a, b),
            DistanceMetric::Dot => -a.dot(&b),
        }
    }

    fn squared_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }

    fn cosine(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let norm_a = a.dot(&a).sqrt() + EPSILON;
        let norm_b = b.dot(&b).sqrt() + EPSILON;

        1.0 - a.dot(&b) / (norm_a * norm_b)
    }

    /// Name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Dot => "dot",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = FewShotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            other => Err(FewShotError::InvalidParameter(format!(
                "unsupported distance metric '{}'",
                other
            ))),
        }
    }
}

/// Distances between every row of `x` and every row of `y`.
///
/// Returns a matrix of shape `(x.nrows(), y.nrows())`.
pub fn pairwise_distances(
    x: &Array2<f64>,
    y: &Array2<f64>,
    metric: DistanceMetric,
) -> Result<Array2<f64>> {
    if x.ncols() != y.ncols() {
        return Err(FewShotError::shape(
            "pairwise distance feature dimension",
            x.ncols(),
            y.ncols(),
        ));
    }

    let mut distances = Array2::zeros((x.nrows(), y.nrows()));
    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            distances[[i, j]] = metric.compute(x_row, y_row);
        }
    }

    Ok(distances)
}

/// Row-wise softmax with max subtraction for numerical stability
pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut result = logits.clone();

    for mut row in result.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max_val).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_squared_euclidean() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![4.0, 5.0, 6.0];

        let dist = DistanceMetric::L2.compute(a.view(), b.view());
        assert_relative_eq!(dist, 27.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cosine() {
        let a = array![1.0, 0.0];
        let b = array![2.0, 0.0];
        let c = array![0.0, 1.0];

        // Same direction = 0 distance
        assert_relative_eq!(DistanceMetric::Cosine.compute(a.view(), b.view()), 0.0, epsilon = 1e-6);
        // Orthogonal = 1 distance
        assert_relative_eq!(DistanceMetric::Cosine.compute(a.view(), c.view()), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dot() {
        let a = array![1.0, 2.0];
        let b = array![3.0, -1.0];

        assert_relative_eq!(DistanceMetric::Dot.compute(a.view(), b.view()), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pairwise_shape() {
        let x = Array2::from_shape_fn((3, 4), |(i, j)| (i + j) as f64);
        let y = Array2::from_shape_fn((5, 4), |(i, j)| (i * j) as f64);

        let distances = pairwise_distances(&x, &y, DistanceMetric::L2).unwrap();

        assert_eq!(distances.dim(), (3, 5));
        assert_relative_eq!(
            distances[[1, 2]],
            DistanceMetric::L2.compute(x.row(1), y.row(2)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_pairwise_dimension_mismatch() {
        let x = Array2::<f64>::zeros((2, 3));
        let y = Array2::<f64>::zeros((2, 4));

        assert!(matches!(
            pairwise_distances(&x, &y, DistanceMetric::Cosine),
            Err(FewShotError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_softmax_rows() {
        let logits = array![[1.0, 2.0, 3.0], [-1000.0, -1000.0, -1000.0]];

        let probs = softmax_rows(&logits);

        for row in probs.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert!(probs[[0, 2]] > probs[[0, 1]]);
        assert_relative_eq!(probs[[1, 0]], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!("l2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::Dot.to_string(), "dot");
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&DistanceMetric::Cosine).unwrap();
        assert_eq!(json, "\"cosine\"");

        let parsed: DistanceMetric = serde_json::from_str("\"l2\"").unwrap();
        assert_eq!(parsed, DistanceMetric::L2);
    }
}
