//! Global reductions: convergence metric and transformed-area fraction.

use crate::comm::{Communicator, ReduceOp};
use crate::field::VariantFields;

/// Largest per-cell change over all workers.
pub fn global_max_change<C: Communicator>(comm: &C, local: f64) -> f64 {
    comm.all_reduce(local, ReduceOp::Max)
}

/// Number of owned `(cell, variant)` pairs with `|η| > norm / 2`.
pub fn count_transformed(eta: &VariantFields, norm: f64) -> usize {
    let threshold = 0.5 * norm;
    eta.iter()
        .map(|field| {
            field
                .owned_values()
                .filter(|value| value.abs() > threshold)
                .count()
        })
        .sum()
}

/// Transformed-area fraction: global count of `(cell, variant)` pairs above
/// half of `norm`, divided by `nx * ny`.
///
/// A cell where several variants pass the threshold is counted once per
/// variant, so the result is only bounded by 3 (not 1) when variants overlap.
///
/// Collective.
pub fn area_fraction<C: Communicator>(comm: &C, eta: &VariantFields, norm: f64) -> f64 {
    let local = count_transformed(eta, norm) as f64;
    let total = comm.all_reduce(local, ReduceOp::Sum);
    total / eta[0].layout().grid.len() as f64
}
