//! Shape tracking for deformable linear objects (cables, wires, ropes).
//!
//! This library tracks an ordered sequence of nodes along a deformable linear
//! object through a stream of depth-camera point clouds.
//!
//! # Architecture
//!
//! Tracking is split into phases:
//! - Phase 1: Initial topology estimate (unregularized CPD on the first frame)
//! - Phase 2: Path sorting of the estimated nodes into a connected chain
//! - Phase 3: LLE weights and smoothness operator on the rest shape
//! - Phase 4: Per-frame CPD-LLE registration
//!
//! Multiple wires are tracked as one combined sequence whose segment layout
//! keeps the kernel and the smoothness term from coupling different wires.
//!
//! # Usage
//!
//! ```ignore
//! use dlo_tracking::{PointCloud, TrackingSession};
//!
//! // Create a session with 35 nodes
//! let mut session = TrackingSession::builder().node_count(35).build()?;
//!
//! // First frame: estimate and sort the nodes
//! let first: Vec<[f32; 3]> = get_depth_points();
//! session.initialize(&PointCloud::from_points(&first))?;
//!
//! // Later frames: track
//! let next: Vec<[f32; 3]> = get_depth_points();
//! let result = session.track(&PointCloud::from_points(&next))?;
//! println!("Converged: {}, sigma2: {}", result.status.is_converged(), result.sigma2);
//! ```

pub mod error;
pub mod lle;
pub mod projection;
pub mod registration;
pub mod session;
pub mod test_utils;
pub mod topology;
pub mod types;

pub use error::{Result, TrackingError};
pub use lle::{build_weights, smoothness_operator, NeighborPolicy};
pub use projection::{CameraIntrinsics, CameraProjection, Overlay, PixelNode};
pub use registration::{
    ConvergenceStatus, CpdLle, CpdLleConfig, DecouplingMode, InitialEstimate,
    InitialEstimateConfig, InitialTopologyEstimator, IterationDebug, RegistrationResult,
};
pub use topology::{sort_path, SegmentLayout, SortConfig, SortResult};
pub use types::{NodeSequence, PointCloud};

// High-level API (recommended for most users)
pub use session::{
    FrameOutcome, FrameResult, InitReport, SessionState, TrackerConfig, TrackerConfigBuilder,
    TrackingSession,
};
