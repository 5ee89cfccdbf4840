//! Error types for node tracking.
//!
//! Sort failures are not errors: [`crate::topology::SortResult`] reports them as
//! a partial sequence plus a `success` flag. Singular neighborhood Gram matrices
//! are recovered inside the weight builder and never reach the caller.

use thiserror::Error;

/// Errors from initialization, weight building and registration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("insufficient data: point cloud has {points} points, at least {required} required")]
    DegenerateInput { points: usize, required: usize },

    #[error("M-step system is singular at iteration {iteration}")]
    SingularSystem { iteration: usize },

    #[error("no correspondences between nodes and points at iteration {iteration}")]
    NoCorrespondences { iteration: usize },

    #[error("node count mismatch: expected {expected}, got {actual}")]
    NodeCountMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tracking session is not initialized")]
    NotInitialized,
}

/// Result alias for node tracking operations.
pub type Result<T> = std::result::Result<T, TrackingError>;
