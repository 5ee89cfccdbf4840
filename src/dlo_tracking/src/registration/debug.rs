//! Per-iteration diagnostics for CPD registration.

use serde::Serialize;

/// State captured at the end of one EM iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationDebug {
    /// Iteration number (0-indexed).
    pub iteration: usize,

    /// Variance used by this iteration's E-step.
    pub sigma2: f64,

    /// Variance after this iteration's update.
    pub sigma2_after: f64,

    /// Summed squared node displacement caused by this iteration.
    pub displacement_sq: f64,

    /// Total responsibility mass `Np`.
    pub np: f64,

    /// Number of points assigned to some node by the hard-correspondence term.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_assignments: Option<usize>,
}

impl IterationDebug {
    /// Create a new iteration debug with default values.
    pub fn new(iteration: usize) -> Self {
        Self {
            iteration,
            sigma2: 0.0,
            sigma2_after: 0.0,
            displacement_sq: 0.0,
            np: 0.0,
            hard_assignments: None,
        }
    }
}
