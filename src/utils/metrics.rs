//! Classification metrics for few-shot episodes

use ndarray::{Array1, Array2, Axis};

use crate::{FewShotError, Result};

/// Index of the largest entry of each row
fn argmax_rows(y_pred: &Array2<f64>) -> Array1<usize> {
    y_pred
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &p)| {
                    if p > best.1 {
                        (i, p)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of rows whose argmax equals the target class.
///
/// Returns 0.0 for an empty batch.
pub fn categorical_accuracy(y: &Array1<usize>, y_pred: &Array2<f64>) -> Result<f64> {
    if y.len() != y_pred.nrows() {
        return Err(FewShotError::shape("accuracy targets", y_pred.nrows(), y.len()));
    }
    if y.is_empty() {
        return Ok(0.0);
    }

    let predicted = argmax_rows(y_pred);
    let correct = predicted.iter().zip(y.iter()).filter(|(p, t)| p == t).count();

    Ok(correct as f64 / y.len() as f64)
}

/// Numerically stable row-wise log-softmax
pub fn log_softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut result = logits.clone();

    for mut row in result.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let log_sum = row.iter().map(|v| (v - max_val).exp()).sum::<f64>().ln() + max_val;
        row.mapv_inplace(|v| v - log_sum);
    }

    result
}

/// Mean negative log-likelihood of the target classes
pub fn nll_loss(log_probs: &Array2<f64>, y: &Array1<usize>) -> Result<f64> {
    if y.len() != log_probs.nrows() {
        return Err(FewShotError::shape("loss targets", log_probs.nrows(), y.len()));
    }
    if let Some(&bad) = y.iter().find(|&&t| t >= log_probs.ncols()) {
        return Err(FewShotError::InvalidParameter(format!(
            "target class {} out of range for {} classes",
            bad,
            log_probs.ncols()
        )));
    }
    if y.is_empty() {
        return Ok(0.0);
    }

    let total: f64 = y
        .iter()
        .enumerate()
        .map(|(row, &target)| -log_probs[[row, target]])
        .sum();

    Ok(total / y.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y = array![0, 1, 2, 1];
        let y_pred = array![
            [0.8, 0.1, 0.1],
            [0.2, 0.7, 0.1],
            [0.5, 0.3, 0.2],
            [0.1, 0.6, 0.3],
        ];

        let accuracy = categorical_accuracy(&y, &y_pred).unwrap();
        assert_relative_eq!(accuracy, 0.75);
    }

    #[test]
    fn test_accuracy_length_mismatch() {
        let y = array![0, 1];
        let y_pred = Array2::zeros((3, 2));
        assert!(categorical_accuracy(&y, &y_pred).is_err());
    }

    #[test]
    fn test_log_softmax() {
        let logits = array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]];

        let log_probs = log_softmax_rows(&logits);

        for row in log_probs.rows() {
            let total: f64 = row.iter().map(|v| v.exp()).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(log_probs[[1, 0]], -(3.0f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_nll_loss() {
        let log_probs = array![[0.5f64.ln(), 0.5f64.ln()], [0.25f64.ln(), 0.75f64.ln()]];
        let y = array![0, 1];

        let loss = nll_loss(&log_probs, &y).unwrap();
        assert_relative_eq!(loss, -(0.5f64.ln() + 0.75f64.ln()) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nll_loss_target_out_of_range() {
        let log_probs = Array2::zeros((1, 2));
        assert!(matches!(
            nll_loss(&log_probs, &array![2]),
            Err(FewShotError::InvalidParameter(_))
        ));
    }
}
