//! Gaussian kernel between rest-shape nodes.
//!
//! `G[i, j] = exp(-d_ij / (2β²))` where `d_ij` is the squared rest-shape
//! distance, or a decoupling coefficient when one is configured. Between nodes
//! of different segments `d_ij` is replaced by the segment penalty, so those
//! entries are small and fixed regardless of how close the wires are.

use nalgebra::DMatrix;

use super::types::DecouplingMode;
use crate::error::{Result, TrackingError};
use crate::topology::SegmentLayout;
use crate::types::NodeSequence;

/// Pairwise squared distances between rows of an `M × 3` matrix.
pub fn pairwise_squared_distances(nodes: &NodeSequence) -> DMatrix<f64> {
    let m = nodes.len();
    let positions: Vec<_> = (0..m).map(|i| nodes.node(i)).collect();
    DMatrix::from_fn(m, m, |i, j| (positions[i] - positions[j]).norm_squared())
}

/// Decoupling coefficients for `node_count` nodes, or `None` when disabled.
///
/// Cross-segment entries are overwritten with `penalty`.
///
/// # Errors
/// `InvalidConfig` if a custom matrix is not `node_count × node_count`.
pub fn decoupling_coefficients(
    mode: &DecouplingMode,
    node_count: usize,
    layout: &SegmentLayout,
    penalty: f64,
) -> Result<Option<DMatrix<f64>>> {
    let mut coeff = match mode {
        DecouplingMode::Disabled => return Ok(None),
        DecouplingMode::IndexDistance { scale } => DMatrix::from_fn(node_count, node_count, |i, j| {
            i.abs_diff(j) as f64 * scale
        }),
        DecouplingMode::Normalized { min, max } => {
            let span = node_count.saturating_sub(1).max(1) as f64;
            DMatrix::from_fn(node_count, node_count, |i, j| {
                min + i.abs_diff(j) as f64 / span * (max - min)
            })
        }
        DecouplingMode::Custom(matrix) => {
            if matrix.nrows() != node_count || matrix.ncols() != node_count {
                return Err(TrackingError::InvalidConfig(format!(
                    "decoupling matrix is {}x{}, expected {node_count}x{node_count}",
                    matrix.nrows(),
                    matrix.ncols()
                )));
            }
            matrix.clone()
        }
    };
    layout.fill_cross_segment(&mut coeff, penalty);
    Ok(Some(coeff))
}

/// Build the kernel matrix `G` on the rest shape.
///
/// # Errors
/// `NodeCountMismatch` if `layout` does not cover `rest`; `InvalidConfig` for
/// a mis-shaped custom decoupling matrix.
pub fn build_kernel(
    rest: &NodeSequence,
    beta: f64,
    mode: &DecouplingMode,
    layout: &SegmentLayout,
    penalty: f64,
) -> Result<DMatrix<f64>> {
    let m = rest.len();
    if layout.node_count() != m {
        return Err(TrackingError::NodeCountMismatch {
            expected: layout.node_count(),
            actual: m,
        });
    }

    let exponent = match decoupling_coefficients(mode, m, layout, penalty)? {
        Some(coeff) => coeff,
        None => {
            let mut d = pairwise_squared_distances(rest);
            layout.fill_cross_segment(&mut d, penalty);
            d
        }
    };

    let scale = 2.0 * beta * beta;
    Ok(exponent.map(|d| (-d / scale).exp()))
}
