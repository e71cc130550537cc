//! Class predictions for Matching Networks
//!
//! Matching Networks classify a query by attending over every support example:
//!
//! ```text
//! P(ŷ = c | x̂, S) = Σᵢ a(x̂, xᵢ) · [yᵢ = c]
//! ```
//!
//! With a class-major support set the indicator reduces to summing contiguous
//! column blocks of the attention matrix.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use tracing::{debug, warn};

use crate::{checked_product, ensure_positive, FewShotError, Result};

/// Maximum deviation of a row sum from 1 that is accepted without renormalising
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Convert a query-to-support attention matrix into per-class probabilities.
///
/// # Arguments
/// * `attention` - Non-negative weights of shape `(q * k, n * k)`
/// * `n` - Support examples per class
/// * `k` - Number of classes
/// * `q` - Query examples per class
///
/// # Returns
/// Predictions of shape `(q * k, k)`; every row sums to 1.
///
/// Columns `c * n .. (c + 1) * n` hold the support examples of class `c`.
/// Summing each block gives the class score. When the attention rows are
/// already distributions the scores sum to 1 as the blocks partition the
/// columns; otherwise each row is rescaled by its total, and a row without
/// any attention mass becomes uniform.
///
/// # Errors
/// - [`FewShotError::InvalidParameter`] if `n`, `k` or `q` is zero
/// - [`FewShotError::ShapeMismatch`] if the attention shape is not `(q * k, n * k)`
/// - [`FewShotError::InvalidValue`] if an entry is negative or not finite
pub fn matching_net_predictions(
    attention: &Array2<f64>,
    n: usize,
    k: usize,
    q: usize,
) -> Result<Array2<f64>> {
    ensure_positive("n", n)?;
    ensure_positive("k", k)?;
    ensure_positive("q", q)?;

    let expected_rows = checked_product("q * k", q, k)?;
    let expected_cols = checked_product("n * k", n, k)?;
    if attention.nrows() != expected_rows {
        return Err(FewShotError::shape(
            "attention rows (q * k)",
            expected_rows,
            attention.nrows(),
        ));
    }
    if attention.ncols() != expected_cols {
        return Err(FewShotError::shape(
            "attention columns (n * k)",
            expected_cols,
            attention.ncols(),
        ));
    }

    if let Some(((row, col), value)) = attention
        .indexed_iter()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(FewShotError::InvalidValue(format!(
            "attention[{}, {}] = {} is not a non-negative finite weight",
            row, col, value
        )));
    }

    let mut predictions = Array2::zeros((expected_rows, k));

    for class_idx in 0..k {
        let start = class_idx * n;
        let block = attention.slice(s![.., start..start + n]);
        predictions
            .column_mut(class_idx)
            .assign(&block.sum_axis(Axis(1)));
    }

    let mut renormalized = 0usize;
    for (row_idx, mut row) in predictions.axis_iter_mut(Axis(0)).enumerate() {
        let mut total = row.sum();
        if (total - 1.0).abs() <= ROW_SUM_TOLERANCE {
            continue;
        }

        // Finite weights can still overflow when summed
        if !total.is_finite() {
            row.assign(&scaled_block_sums(attention.row(row_idx), n, k));
            total = row.sum();
        }

        renormalized += 1;
        if total > 0.0 {
            row.mapv_inplace(|p| p / total);
        } else {
            row.fill(1.0 / k as f64);
        }
    }

    if renormalized > 0 {
        warn!(
            rows = renormalized,
            "attention rows were not row-stochastic; renormalized class scores"
        );
    }

    debug!(n, k, q, "computed matching network predictions");
    Ok(predictions)
}

/// Block sums of one attention row divided by its largest weight.
///
/// Each scaled sum is at most `n`, so the result stays finite.
fn scaled_block_sums(weights: ArrayView1<f64>, n: usize, k: usize) -> Array1<f64> {
    let max_weight = weights.fold(0.0_f64, |acc, &w| acc.max(w));
    if max_weight <= 0.0 {
        return Array1::zeros(k);
    }

    Array1::from_shape_fn(k, |class_idx| {
        let start = class_idx * n;
        weights
            .slice(s![start..start + n])
            .iter()
            .map(|&w| w / max_weight)
            .sum()
    })
}
