//! Initial topology estimate from the first frame.
//!
//! Plain coherent point drift without any shape regularization: nodes start on
//! a short straight line along +x and, each iteration, move to the
//! responsibility-weighted mean of the cloud. The variance is re-estimated as
//! the responsibility-weighted mean squared deviation from the nodes used in
//! that iteration's E-step.
//!
//! The loop always runs the configured number of iterations; there is no
//! convergence test. The resulting nodes are unordered and are handed to the
//! path sorter afterwards.

use tracing::debug;

use super::correspondence::{data_variance, expectation};
use super::solver::MIN_VARIANCE;
use super::types::InitialEstimateConfig;
use crate::error::{Result, TrackingError};
use crate::types::{NodeSequence, PointCloud, DIM};

/// Unordered nodes and variance from the initial estimate.
#[derive(Debug, Clone)]
pub struct InitialEstimate {
    /// Fitted nodes, in no particular order along the object.
    pub nodes: NodeSequence,

    /// Final variance.
    pub sigma2: f64,

    /// Number of iterations performed.
    pub iterations: usize,
}

/// Straight seed line: node `i` at `(i · length / M, 0, 0)`.
pub fn seed_line(node_count: usize, length: f64) -> NodeSequence {
    let spacing = length / node_count.max(1) as f64;
    let points: Vec<[f64; 3]> = (0..node_count)
        .map(|i| [i as f64 * spacing, 0.0, 0.0])
        .collect();
    NodeSequence::from_points(&points)
}

/// Fits an unordered node set to the first frame.
#[derive(Debug, Clone)]
pub struct InitialTopologyEstimator {
    config: InitialEstimateConfig,
}

impl InitialTopologyEstimator {
    /// Create an estimator with the given configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if a parameter is out of range.
    pub fn new(config: InitialEstimateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an estimator with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: InitialEstimateConfig::default(),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &InitialEstimateConfig {
        &self.config
    }

    /// Estimate `node_count` nodes from `cloud`.
    ///
    /// # Errors
    /// - `DegenerateInput` if the cloud has fewer than `min_points` points
    /// - `NoCorrespondences` if every responsibility vanishes
    pub fn estimate(&self, cloud: &PointCloud) -> Result<InitialEstimate> {
        let config = &self.config;
        let required = config.min_points.max(1);
        if cloud.len() < required {
            return Err(TrackingError::DegenerateInput {
                points: cloud.len(),
                required,
            });
        }

        let x = cloud.as_matrix();
        let mut y = seed_line(config.node_count, config.line_length).into_matrix();
        let mut sigma2 = match config.initial_variance {
            Some(sigma2) => sigma2,
            None => data_variance(x, &y),
        };

        for iteration in 0..config.max_iterations {
            let corr = expectation(x, &y, sigma2, config.mu);
            if !(corr.np > f64::EPSILON) {
                return Err(TrackingError::NoCorrespondences { iteration });
            }

            // Σ P[m, n] · ‖x_n − y_m‖², against the nodes used in the E-step
            let mut weighted_sq = 0.0;
            for m in 0..y.nrows() {
                for n in 0..x.nrows() {
                    let p = corr.p[(m, n)];
                    if p == 0.0 {
                        continue;
                    }
                    let d: f64 = (0..DIM).map(|k| (x[(n, k)] - y[(m, k)]).powi(2)).sum();
                    weighted_sq += p * d;
                }
            }

            for m in 0..y.nrows() {
                let mass = corr.p1[m];
                // Nodes that explain nothing keep their position.
                if mass > f64::EPSILON {
                    for k in 0..DIM {
                        y[(m, k)] = corr.px[(m, k)] / mass;
                    }
                }
            }

            sigma2 = weighted_sq / (corr.np * DIM as f64);
            if !(sigma2 > MIN_VARIANCE) {
                sigma2 = MIN_VARIANCE;
            }
        }

        debug!(
            nodes = config.node_count,
            points = cloud.len(),
            sigma2,
            "Initial estimate finished"
        );

        let nodes = NodeSequence::from_matrix(y).ok_or(TrackingError::NodeCountMismatch {
            expected: config.node_count,
            actual: 0,
        })?;

        Ok(InitialEstimate {
            nodes,
            sigma2,
            iterations: config.max_iterations,
        })
    }
}
