//! Locally linear embedding (LLE) weights.
//!
//! Each node is expressed as an affine combination of a few neighbors on the
//! rest shape. The smoothness operator `H = (I - W)ᵀ(I - W)` built from these
//! weights penalizes deformations that break the local reconstruction.

pub mod neighbors;
pub mod weights;

pub use neighbors::{select_neighbors, sequential_neighbors, NeighborPolicy, NodeSearch};
pub use weights::{build_weights, smoothness_operator, GRAM_REGULARIZATION};
