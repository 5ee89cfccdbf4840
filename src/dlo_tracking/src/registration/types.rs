//! Type definitions for CPD registration.

use nalgebra::DMatrix;
use serde::Serialize;

use super::debug::IterationDebug;
use crate::error::{Result, TrackingError};
use crate::lle::NeighborPolicy;
use crate::topology::DEFAULT_SEGMENT_PENALTY;
use crate::types::NodeSequence;

/// Default minimum number of cloud points accepted by registration.
pub const DEFAULT_MIN_POINTS: usize = 10;

/// Coefficient matrix used in place of squared Euclidean distance when
/// building the kernel.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DecouplingMode {
    /// Kernel from rest-shape distances.
    #[default]
    Disabled,

    /// `coeff[i, j] = |i - j| * scale`.
    IndexDistance { scale: f64 },

    /// `coeff[i, j] = min + |i - j| / (M - 1) * (max - min)`.
    Normalized { min: f64, max: f64 },

    /// Caller-supplied `M × M` coefficients.
    Custom(DMatrix<f64>),
}

/// Configuration for CPD-LLE tracking.
#[derive(Debug, Clone)]
pub struct CpdLleConfig {
    /// Kernel bandwidth.
    pub beta: f64,

    /// Ridge strength on the displacement field.
    pub alpha: f64,

    /// LLE neighborhood size (even).
    pub k: usize,

    /// Smoothness strength.
    pub gamma: f64,

    /// Weight of the uniform outlier component, in `[0, 1)`.
    pub mu: f64,

    /// Maximum number of EM iterations.
    pub max_iterations: usize,

    /// Convergence threshold on the summed squared node displacement between
    /// consecutive iterations.
    pub tolerance: f64,

    /// Whether the LLE smoothness term enters the M-step.
    pub include_smoothness: bool,

    /// How LLE neighbors are chosen on the rest shape.
    pub neighbor_policy: NeighborPolicy,

    /// Kernel coefficients.
    pub decoupling: DecouplingMode,

    /// Coefficient for kernel entries between nodes of different segments.
    pub segment_penalty: f64,

    /// Keep the caller-supplied variance for the whole call instead of
    /// re-estimating it every iteration.
    pub carry_over_variance: bool,

    /// Weight of the hard-correspondence term. `None` disables it.
    ///
    /// The term enters the M-step scaled by `σ² / omega`, so small values
    /// (the usual is 1e-7) make it dominant.
    pub hard_correspondence_omega: Option<f64>,

    /// Clouds with fewer points are rejected before the first E-step.
    pub min_points: usize,

    /// Record per-iteration diagnostics in the result.
    pub collect_debug: bool,
}

impl Default for CpdLleConfig {
    fn default() -> Self {
        Self {
            beta: 2.0,
            alpha: 1.0,
            k: 6,
            gamma: 3.0,
            mu: 0.05,
            max_iterations: 30,
            tolerance: 1e-5,
            include_smoothness: true,
            neighbor_policy: NeighborPolicy::Sequential,
            decoupling: DecouplingMode::Disabled,
            segment_penalty: DEFAULT_SEGMENT_PENALTY,
            carry_over_variance: false,
            hard_correspondence_omega: None,
            min_points: DEFAULT_MIN_POINTS,
            collect_debug: false,
        }
    }
}

impl CpdLleConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        validate_mu(self.mu)?;
        if !(self.beta > 0.0) {
            return Err(invalid(format!("beta must be positive, got {}", self.beta)));
        }
        if !(self.alpha >= 0.0) {
            return Err(invalid(format!("alpha must be non-negative, got {}", self.alpha)));
        }
        if !(self.gamma >= 0.0) {
            return Err(invalid(format!("gamma must be non-negative, got {}", self.gamma)));
        }
        if self.include_smoothness && (self.k == 0 || self.k % 2 != 0) {
            return Err(invalid(format!(
                "LLE neighborhood size must be even and positive, got {}",
                self.k
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be positive".to_string()));
        }
        if !(self.tolerance >= 0.0) {
            return Err(invalid(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if let Some(omega) = self.hard_correspondence_omega {
            if !(omega > 0.0) {
                return Err(invalid(format!("omega must be positive, got {omega}")));
            }
        }
        match &self.decoupling {
            DecouplingMode::IndexDistance { scale } if !(*scale >= 0.0) => {
                return Err(invalid(format!(
                    "decoupling scale must be non-negative, got {scale}"
                )));
            }
            DecouplingMode::Normalized { min, max } if !(min.is_finite() && max >= min) => {
                return Err(invalid(format!(
                    "decoupling range must satisfy min <= max, got {min}..{max}"
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Configuration for the initial topology estimate.
#[derive(Debug, Clone)]
pub struct InitialEstimateConfig {
    /// Number of nodes to fit.
    pub node_count: usize,

    /// Weight of the uniform outlier component, in `[0, 1)`.
    pub mu: f64,

    /// Number of EM iterations. Always run in full.
    pub max_iterations: usize,

    /// Length of the straight seed line the nodes start on (meters).
    pub line_length: f64,

    /// Starting variance. `None` estimates it from the data.
    pub initial_variance: Option<f64>,

    /// Clouds with fewer points are rejected.
    pub min_points: usize,
}

impl Default for InitialEstimateConfig {
    fn default() -> Self {
        Self {
            node_count: 35,
            mu: 0.05,
            max_iterations: 50,
            line_length: 0.1,
            initial_variance: None,
            min_points: DEFAULT_MIN_POINTS,
        }
    }
}

impl InitialEstimateConfig {
    /// Create a configuration for `node_count` nodes.
    pub fn with_node_count(node_count: usize) -> Self {
        Self {
            node_count,
            ..Default::default()
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        validate_mu(self.mu)?;
        if self.node_count == 0 {
            return Err(invalid("node_count must be positive".to_string()));
        }
        if let Some(sigma2) = self.initial_variance {
            if !(sigma2 > 0.0 && sigma2.is_finite()) {
                return Err(invalid(format!(
                    "initial variance must be positive, got {sigma2}"
                )));
            }
        }
        Ok(())
    }
}

/// How a registration call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// Node displacement fell below the tolerance.
    Converged,

    /// Ran the full iteration budget.
    MaxIterations,
}

impl ConvergenceStatus {
    /// Check if the registration converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged)
    }
}

/// Result of a registration call.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Updated nodes, same count and order as the input.
    pub nodes: NodeSequence,

    /// Variance after the last iteration (the input variance when carried over).
    pub sigma2: f64,

    /// Convergence status.
    pub status: ConvergenceStatus,

    /// Number of iterations performed.
    pub iterations: usize,

    /// Per-iteration diagnostics, empty unless requested.
    pub iteration_debug: Vec<IterationDebug>,
}

fn validate_mu(mu: f64) -> Result<()> {
    if (0.0..1.0).contains(&mu) {
        Ok(())
    } else {
        Err(invalid(format!("mu must lie in [0, 1), got {mu}")))
    }
}

fn invalid(message: String) -> TrackingError {
    TrackingError::InvalidConfig(message)
}
