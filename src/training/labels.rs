//! Episode labels for class-major batches

use ndarray::Array1;

/// Labels `[0; q] ++ [1; q] ++ ... ++ [k - 1; q]` for a class-major query set.
///
/// Episode labels refer to the position of a class within the task, not to
/// the dataset class id.
pub fn create_nshot_task_label(k: usize, q: usize) -> Array1<usize> {
    (0..k)
        .flat_map(|class_idx| std::iter::repeat(class_idx).take(q))
        .collect()
}
