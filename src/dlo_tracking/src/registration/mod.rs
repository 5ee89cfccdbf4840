//! Coherent point drift (CPD) registration of node sequences.
//!
//! - [`InitialTopologyEstimator`]: unregularized CPD that contracts a seed
//!   line onto the first frame.
//! - [`CpdLle`]: per-frame tracking with a Gaussian kernel on the rest shape
//!   and an LLE smoothness term.
//!
//! Based on Myronenko & Song 2010 and Chi & Berenson 2019.

pub mod correspondence;
pub mod debug;
pub mod initial;
pub mod kernel;
pub mod solver;
pub mod types;

pub use correspondence::{expectation, Correspondence};
pub use debug::IterationDebug;
pub use initial::{seed_line, InitialEstimate, InitialTopologyEstimator};
pub use kernel::{build_kernel, decoupling_coefficients};
pub use solver::CpdLle;
pub use types::{
    ConvergenceStatus, CpdLleConfig, DecouplingMode, InitialEstimateConfig, RegistrationResult,
    DEFAULT_MIN_POINTS,
};
