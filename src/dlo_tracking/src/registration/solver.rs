//! CPD-LLE registration engine.
//!
//! Each call treats the previous nodes as the rest shape `Y0` and iterates:
//! 1. E-step: soft correspondences `P` with the current variance
//! 2. M-step: solve `A·W = B` for the displacement coefficients
//! 3. Update nodes: `Y = Y0 + G·W`
//! 4. Update variance (unless it is carried over)
//! 5. Stop when the squared node displacement drops below the tolerance
//!
//! With `P1 = P·1`, `PX = P·X` and the LLE operator `H`:
//!
//! ```text
//! A = diag(P1)·G + α·σ²·I + σ²·γ·H·G
//! B = PX − (diag(P1) + σ²·γ·H)·Y0
//! ```
//!
//! The hard-correspondence term adds `σ²/ω·diag(P̃1)·G` to `A` and
//! `σ²/ω·(P̃X − diag(P̃1)·Y0)` to `B`, where `P̃` assigns each point to its
//! most probable node.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::correspondence::{data_variance, expectation, hard_assignment, updated_variance};
use super::debug::IterationDebug;
use super::kernel::build_kernel;
use super::types::{ConvergenceStatus, CpdLleConfig, RegistrationResult};
use crate::error::{Result, TrackingError};
use crate::lle::{build_weights, smoothness_operator};
use crate::topology::SegmentLayout;
use crate::types::{NodeSequence, PointCloud};

/// Smallest variance the engine continues with.
pub const MIN_VARIANCE: f64 = 1e-12;

/// `diag(v)·M` without forming the diagonal matrix.
fn scale_rows(v: &DVector<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| v[i] * m[(i, j)])
}

/// Terms that depend only on the rest shape.
struct RestShape {
    y0: DMatrix<f64>,
    g: DMatrix<f64>,
    /// `H·G` and `H·Y0`, present when smoothness is enabled.
    smoothness: Option<(DMatrix<f64>, DMatrix<f64>)>,
}

/// CPD-LLE tracker for one node sequence.
///
/// The engine holds no cross-frame state; previous nodes and variance are
/// passed into every call.
#[derive(Debug, Clone)]
pub struct CpdLle {
    config: CpdLleConfig,
}

impl CpdLle {
    /// Create an engine with the given configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if a parameter is out of range.
    pub fn new(config: CpdLleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: CpdLleConfig::default(),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &CpdLleConfig {
        &self.config
    }

    fn rest_shape(&self, previous: &NodeSequence, layout: &SegmentLayout) -> Result<RestShape> {
        let config = &self.config;
        let g = build_kernel(
            previous,
            config.beta,
            &config.decoupling,
            layout,
            config.segment_penalty,
        )?;
        let y0 = previous.as_matrix().clone();

        let smoothness = if config.include_smoothness {
            let weights = build_weights(previous, config.k, config.neighbor_policy, layout)?;
            let h = smoothness_operator(&weights);
            Some((&h * &g, &h * &y0))
        } else {
            None
        };

        Ok(RestShape { y0, g, smoothness })
    }

    fn initial_variance(
        &self,
        points: &DMatrix<f64>,
        previous: &NodeSequence,
        prev_sigma2: Option<f64>,
    ) -> Result<f64> {
        if !self.config.carry_over_variance {
            return Ok(data_variance(points, previous.as_matrix()));
        }
        match prev_sigma2 {
            Some(sigma2) if sigma2 > 0.0 && sigma2.is_finite() => Ok(sigma2),
            Some(sigma2) => Err(TrackingError::InvalidConfig(format!(
                "carried-over variance must be positive, got {sigma2}"
            ))),
            None => Err(TrackingError::InvalidConfig(
                "variance carry-over requires a previous variance".to_string(),
            )),
        }
    }

    /// Register `previous` nodes to the current `cloud`.
    ///
    /// # Arguments
    /// * `cloud` - Current frame's points
    /// * `previous` - Nodes from the previous frame, used as the rest shape
    /// * `prev_sigma2` - Previous variance; required when variance carry-over
    ///   is enabled, ignored otherwise
    /// * `layout` - Segment layout of `previous`
    ///
    /// # Errors
    /// - `DegenerateInput` if the cloud has fewer than `min_points` points
    /// - `NodeCountMismatch` if `layout` does not match `previous`
    /// - `NoCorrespondences` if no node explains any point
    /// - `SingularSystem` if the M-step system cannot be solved
    pub fn track(
        &self,
        cloud: &PointCloud,
        previous: &NodeSequence,
        prev_sigma2: Option<f64>,
        layout: &SegmentLayout,
    ) -> Result<RegistrationResult> {
        let config = &self.config;
        let required = config.min_points.max(1);
        if cloud.len() < required {
            return Err(TrackingError::DegenerateInput {
                points: cloud.len(),
                required,
            });
        }
        if previous.is_empty() || layout.node_count() != previous.len() {
            return Err(TrackingError::NodeCountMismatch {
                expected: layout.node_count(),
                actual: previous.len(),
            });
        }

        let x = cloud.as_matrix();
        let m = previous.len();
        let rest = self.rest_shape(previous, layout)?;
        let mut sigma2 = self.initial_variance(x, previous, prev_sigma2)?;

        let mut y = rest.y0.clone();
        let mut status = ConvergenceStatus::MaxIterations;
        let mut iterations = 0;
        let mut iteration_debug = Vec::new();

        for iteration in 0..config.max_iterations {
            iterations = iteration + 1;

            let corr = expectation(x, &y, sigma2, config.mu);
            if !(corr.np > f64::EPSILON) {
                return Err(TrackingError::NoCorrespondences { iteration });
            }

            let mut a = scale_rows(&corr.p1, &rest.g);
            for i in 0..m {
                a[(i, i)] += config.alpha * sigma2;
            }
            let mut b = &corr.px - scale_rows(&corr.p1, &rest.y0);

            if let Some((hg, hy0)) = &rest.smoothness {
                let s = sigma2 * config.gamma;
                a += hg * s;
                b -= hy0 * s;
            }

            let mut hard_assignments = None;
            if let Some(omega) = config.hard_correspondence_omega {
                // No H·Y0 pull here: (I - W)·Y0 vanishes on the rest shape.
                let (counts, sums) = hard_assignment(&corr.p, x);
                let s = sigma2 / omega;
                a += scale_rows(&counts, &rest.g) * s;
                b += (sums - scale_rows(&counts, &rest.y0)) * s;
                hard_assignments = Some(counts.sum() as usize);
            }

            let w = a
                .lu()
                .solve(&b)
                .filter(|w| w.iter().all(|v| v.is_finite()))
                .ok_or(TrackingError::SingularSystem { iteration })?;

            let t = &rest.y0 + &rest.g * w;

            let sigma2_before = sigma2;
            if !config.carry_over_variance {
                sigma2 = updated_variance(x, &corr, &t);
                if !(sigma2 > MIN_VARIANCE) {
                    debug!(iteration, sigma2, "Clamping variance");
                    sigma2 = MIN_VARIANCE;
                }
            }

            let displacement_sq = (&y - &t).norm_squared();
            y = t;

            if config.collect_debug {
                iteration_debug.push(IterationDebug {
                    sigma2: sigma2_before,
                    sigma2_after: sigma2,
                    displacement_sq,
                    np: corr.np,
                    hard_assignments,
                    ..IterationDebug::new(iteration)
                });
            }

            if displacement_sq < config.tolerance {
                status = ConvergenceStatus::Converged;
                break;
            }
        }

        debug!(
            iterations,
            sigma2,
            converged = status.is_converged(),
            "CPD-LLE registration finished"
        );

        let nodes = NodeSequence::from_matrix(y).ok_or(TrackingError::NodeCountMismatch {
            expected: m,
            actual: 0,
        })?;

        Ok(RegistrationResult {
            nodes,
            sigma2,
            status,
            iterations,
            iteration_debug,
        })
    }
}
