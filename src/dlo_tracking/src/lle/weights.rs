//! LLE reconstruction weights and the smoothness operator.
//!
//! For node `i` with neighbors `N(i)`, the weights minimize
//! `|y_i - Σ_j w_ij y_j|²` subject to `Σ_j w_ij = 1`. With the local Gram
//! matrix `C = (y_j - y_i)·(y_l - y_i)ᵀ` over `j, l ∈ N(i)`, the solution is
//! `w ∝ C⁻¹·1`, normalized to sum to one.
//!
//! When `k` exceeds the dimension of the space spanned by the neighbor offsets
//! (always the case for `k > 3`, and for any `k > 1` on a straight wire) `C`
//! is singular; a ridge of [`GRAM_REGULARIZATION`] is then added to its
//! diagonal. Well-conditioned Gram matrices are solved unregularized.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::neighbors::{select_neighbors, NeighborPolicy};
use crate::error::{Result, TrackingError};
use crate::topology::SegmentLayout;
use crate::types::NodeSequence;

/// Ridge added to a singular or ill-conditioned Gram matrix.
pub const GRAM_REGULARIZATION: f64 = 1e-5;

/// Gram matrices with a larger condition number are regularized.
const MAX_CONDITION_NUMBER: f64 = 1e12;

/// Compute the condition number of a square matrix from its singular values.
///
/// Returns infinity when the smallest singular value is effectively zero.
fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    let svd = matrix.clone().svd(false, false);
    let singular_values = &svd.singular_values;

    let max_sv = singular_values.max();
    let min_sv = singular_values.min();

    if min_sv < 1e-15 {
        f64::INFINITY
    } else {
        max_sv / min_sv
    }
}

/// Solve `C·w = 1` and normalize `w` to sum to one.
///
/// Returns `None` if the system cannot be solved or the weights do not
/// normalize.
fn solve_normalized(gram: DMatrix<f64>) -> Option<DVector<f64>> {
    let ones = DVector::from_element(gram.nrows(), 1.0);
    let w = gram.lu().solve(&ones)?;
    let sum = w.sum();
    if !sum.is_finite() || sum.abs() < f64::EPSILON {
        return None;
    }
    let w = w / sum;
    w.iter().all(|v| v.is_finite()).then_some(w)
}

/// Reconstruction weights of `center` from `neighbors`.
///
/// Returns the weights and whether regularization was needed.
fn local_weights(
    nodes: &NodeSequence,
    center: usize,
    neighbors: &[usize],
) -> Option<(DVector<f64>, bool)> {
    let origin = nodes.node(center);
    let k = neighbors.len();
    let offsets = DMatrix::from_fn(k, 3, |r, c| nodes.node(neighbors[r])[c] - origin[c]);
    let gram = &offsets * offsets.transpose();

    if condition_number(&gram) <= MAX_CONDITION_NUMBER {
        if let Some(w) = solve_normalized(gram.clone()) {
            return Some((w, false));
        }
    }

    let regularized = gram + DMatrix::identity(k, k) * GRAM_REGULARIZATION;
    solve_normalized(regularized).map(|w| (w, true))
}

/// Build the `M × M` LLE weight matrix for `nodes`.
///
/// Row `i` holds the reconstruction weights of node `i` at its neighbor
/// columns and zero elsewhere, so `W[i, i] == 0` and each non-empty row sums
/// to one. Neighbors never cross a segment boundary of `layout`.
///
/// # Errors
/// - `InvalidConfig` if `k` is zero
/// - `NodeCountMismatch` if `layout` does not cover exactly `nodes`
/// - `SingularSystem` if a Gram matrix stays singular after regularization,
///   which only happens for coincident or non-finite nodes
pub fn build_weights(
    nodes: &NodeSequence,
    k: usize,
    policy: NeighborPolicy,
    layout: &SegmentLayout,
) -> Result<DMatrix<f64>> {
    if k == 0 {
        return Err(TrackingError::InvalidConfig(
            "LLE neighborhood size must be positive".to_string(),
        ));
    }
    let m = nodes.len();
    if layout.node_count() != m {
        return Err(TrackingError::NodeCountMismatch {
            expected: layout.node_count(),
            actual: m,
        });
    }

    let neighbor_lists = select_neighbors(nodes, k, policy, layout);
    let mut weights = DMatrix::zeros(m, m);
    let mut regularized_rows = 0;

    for (i, neighbors) in neighbor_lists.iter().enumerate() {
        if neighbors.is_empty() {
            continue;
        }
        let (w, regularized) = local_weights(nodes, i, neighbors)
            .ok_or(TrackingError::SingularSystem { iteration: 0 })?;
        if regularized {
            regularized_rows += 1;
        }
        for (&j, &value) in neighbors.iter().zip(w.iter()) {
            weights[(i, j)] = value;
        }
    }

    if regularized_rows > 0 {
        debug!("Regularized {regularized_rows} of {m} LLE Gram matrices");
    }

    Ok(weights)
}

/// Smoothness operator `H = (I - W)ᵀ(I - W)`.
pub fn smoothness_operator(weights: &DMatrix<f64>) -> DMatrix<f64> {
    let m = weights.nrows();
    let residual = DMatrix::identity(m, m) - weights;
    residual.transpose() * residual
}
