//! Prototype computation for prototypical networks

use ndarray::{s, Array2, Axis};
use tracing::debug;

use crate::data::GroupedBatch;
use crate::{checked_product, ensure_positive, FewShotError, Result};

/// Compute one prototype per class from a class-major support set.
///
/// `support` must hold `n * k` embeddings where rows `i * n .. (i + 1) * n`
/// belong to class `i`. Row `i` of the result is the arithmetic mean of that
/// block, so the output has shape `(k, d)`.
///
/// # Errors
/// - [`FewShotError::InvalidParameter`] if `k` or `n` is zero
/// - [`FewShotError::ShapeMismatch`] if `support` does not have exactly `n * k` rows
///
/// # Example
/// ```
/// use few_shot_networks::network::compute_prototypes;
/// use ndarray::array;
///
/// let support = array![[1.0, 0.0], [3.0, 0.0], [0.0, 5.0], [0.0, 7.0]];
/// let prototypes = compute_prototypes(&support, 2, 2).unwrap();
/// assert_eq!(prototypes, array![[2.0, 0.0], [0.0, 6.0]]);
/// ```
pub fn compute_prototypes(support: &Array2<f64>, k: usize, n: usize) -> Result<Array2<f64>> {
    ensure_positive("k", k)?;
    ensure_positive("n", n)?;

    let expected_rows = checked_product("n * k", n, k)?;
    if support.nrows() != expected_rows {
        return Err(FewShotError::shape(
            "support set rows (n * k)",
            expected_rows,
            support.nrows(),
        ));
    }

    let embed_dim = support.ncols();
    let mut prototypes = Array2::zeros((k, embed_dim));

    for (class_idx, mut prototype) in prototypes.axis_iter_mut(Axis(0)).enumerate() {
        let start = class_idx * n;
        let block = support.slice(s![start..start + n, ..]);

        // Centroid of the class block
        let centroid = block.sum_axis(Axis(0)) / n as f64;
        prototype.assign(&centroid);
    }

    debug!(k, n, embed_dim, "computed class prototypes");
    Ok(prototypes)
}

/// Compute prototypes from a batch whose grouping is already validated.
pub fn compute_prototypes_grouped(support: &GroupedBatch) -> Result<Array2<f64>> {
    compute_prototypes(support.data(), support.ways(), support.shots())
}
