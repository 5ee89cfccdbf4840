//! E-step of coherent point drift.
//!
//! Soft correspondences between `M` nodes and `N` cloud points under an
//! isotropic Gaussian mixture centered on the nodes plus a uniform outlier
//! component. Columns of `P` (one per point) are independent and computed in
//! parallel.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::types::DIM;

/// Responsibilities and their aggregates for one E-step.
#[derive(Debug, Clone)]
pub struct Correspondence {
    /// `M × N` posterior of node `m` having generated point `n`.
    pub p: DMatrix<f64>,

    /// Per-node responsibility sums `P·1` (length M).
    pub p1: DVector<f64>,

    /// Per-point responsibility sums `Pᵀ·1` (length N).
    pub pt1: DVector<f64>,

    /// Responsibility-weighted point sums `P·X` (`M × 3`).
    pub px: DMatrix<f64>,

    /// Total responsibility mass `Σ P1`.
    pub np: f64,
}

/// Uniform outlier term added to each column normalizer.
///
/// `c = (2πσ²)^(D/2) · mu / (1 - mu) · M / N`
pub fn outlier_constant(sigma2: f64, mu: f64, node_count: usize, point_count: usize) -> f64 {
    (2.0 * std::f64::consts::PI * sigma2).powf(DIM as f64 / 2.0) * mu / (1.0 - mu)
        * node_count as f64
        / point_count as f64
}

/// Squared distances from every node to one point.
fn column_distances(nodes: &DMatrix<f64>, points: &DMatrix<f64>, n: usize) -> Vec<f64> {
    let (x, y, z) = (points[(n, 0)], points[(n, 1)], points[(n, 2)]);
    (0..nodes.nrows())
        .map(|m| {
            let dx = nodes[(m, 0)] - x;
            let dy = nodes[(m, 1)] - y;
            let dz = nodes[(m, 2)] - z;
            dx * dx + dy * dy + dz * dz
        })
        .collect()
}

/// Run the E-step.
///
/// # Arguments
/// * `points` - `N × 3` cloud
/// * `nodes` - `M × 3` current node estimate
/// * `sigma2` - variance from the previous iteration
/// * `mu` - outlier weight
pub fn expectation(
    points: &DMatrix<f64>,
    nodes: &DMatrix<f64>,
    sigma2: f64,
    mu: f64,
) -> Correspondence {
    let m = nodes.nrows();
    let n = points.nrows();
    let c = outlier_constant(sigma2, mu, m, n);
    let scale = 2.0 * sigma2;

    let columns: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|col| {
            let mut affinity: Vec<f64> = column_distances(nodes, points, col)
                .into_iter()
                .map(|d| (-d / scale).exp())
                .collect();
            let mut den: f64 = affinity.iter().sum();
            if den == 0.0 {
                den = f64::EPSILON;
            }
            den += c;
            for a in &mut affinity {
                *a /= den;
            }
            affinity
        })
        .collect();

    let p = DMatrix::from_fn(m, n, |row, col| columns[col][row]);

    let mut p1 = DVector::zeros(m);
    let mut pt1 = DVector::zeros(n);
    for col in 0..n {
        for row in 0..m {
            let v = p[(row, col)];
            p1[row] += v;
            pt1[col] += v;
        }
    }
    let np = p1.sum();
    let px = &p * points;

    Correspondence {
        p,
        p1,
        pt1,
        px,
        np,
    }
}

/// Hardened correspondences: each point assigned to its most probable node.
///
/// Returns per-node assignment counts `P̃·1` and assigned point sums `P̃·X`.
/// On ties the lowest node index wins. Points with zero responsibility to
/// every node are left unassigned rather than attributed to node 0.
pub fn hard_assignment(p: &DMatrix<f64>, points: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let m = p.nrows();
    let mut counts = DVector::zeros(m);
    let mut sums = DMatrix::zeros(m, DIM);

    for col in 0..p.ncols() {
        let mut best: Option<(usize, f64)> = None;
        for row in 0..m {
            let v = p[(row, col)];
            if v > 0.0 && best.map_or(true, |(_, bv)| v > bv) {
                best = Some((row, v));
            }
        }
        if let Some((row, _)) = best {
            counts[row] += 1.0;
            for d in 0..DIM {
                sums[(row, d)] += points[(col, d)];
            }
        }
    }

    (counts, sums)
}

/// Variance estimate from all node-point pairs: `Σ‖x_n - y_m‖² / (D·M·N)`.
pub fn data_variance(points: &DMatrix<f64>, nodes: &DMatrix<f64>) -> f64 {
    let m = nodes.nrows();
    let n = points.nrows();
    let total: f64 = (0..n)
        .into_par_iter()
        .map(|col| column_distances(nodes, points, col).iter().sum::<f64>())
        .collect::<Vec<f64>>()
        .iter()
        .sum();
    total / (DIM * m * n) as f64
}

/// Trace-form variance update for transformed nodes `t`.
///
/// `(Σ Pt1[n]·‖x_n‖² − 2·Σ PX ∘ T + Σ P1[m]·‖t_m‖²) / (Np·D)`
pub fn updated_variance(
    points: &DMatrix<f64>,
    correspondence: &Correspondence,
    t: &DMatrix<f64>,
) -> f64 {
    let mut x_term = 0.0;
    for n in 0..points.nrows() {
        let norm_sq: f64 = (0..DIM).map(|d| points[(n, d)] * points[(n, d)]).sum();
        x_term += correspondence.pt1[n] * norm_sq;
    }
    let cross_term = correspondence.px.component_mul(t).sum();
    let mut t_term = 0.0;
    for m in 0..t.nrows() {
        let norm_sq: f64 = (0..DIM).map(|d| t[(m, d)] * t[(m, d)]).sum();
        t_term += correspondence.p1[m] * norm_sq;
    }

    (x_term - 2.0 * cross_term + t_term) / (correspondence.np * DIM as f64)
}
