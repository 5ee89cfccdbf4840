//! Frame-by-frame tracking session.
//!
//! A [`TrackingSession`] owns the cross-frame state (node sequence, variance
//! and segment layout) and moves through three states:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --track--> Tracking
//!       ^                                                  |
//!       +---------------------- reset ---------------------+
//! ```
//!
//! Frames must be fed one at a time, in arrival order.
//!
//! # Example
//!
//! ```ignore
//! use dlo_tracking::{PointCloud, TrackingSession};
//!
//! let mut session = TrackingSession::builder()
//!     .node_count(35)
//!     .beta(2.0)
//!     .build()?;
//!
//! for frame in frames {
//!     let cloud = PointCloud::from_points(&frame);
//!     session.process_frame(&cloud)?;
//!     println!("{:?}", session.nodes());
//! }
//! ```

use tracing::{info, warn};

use crate::error::{Result, TrackingError};
use crate::lle::NeighborPolicy;
use crate::registration::{
    ConvergenceStatus, CpdLle, CpdLleConfig, DecouplingMode, InitialEstimateConfig,
    InitialTopologyEstimator, IterationDebug,
};
use crate::topology::{sort_path, SegmentLayout, SortConfig};
use crate::types::{NodeSequence, PointCloud};

/// Lifecycle state of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No node sequence yet.
    Uninitialized,

    /// Nodes estimated and sorted; no frame tracked yet.
    Initialized,

    /// At least one frame tracked.
    Tracking,
}

/// Configuration for a tracking session.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// First-frame topology estimate.
    pub initial: InitialEstimateConfig,

    /// Path sorting of the estimated nodes.
    pub sort: SortConfig,

    /// Per-frame registration.
    pub registration: CpdLleConfig,
}

/// Builder for [`TrackingSession`] configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
        }
    }

    /// Set the number of nodes fitted on the first frame.
    pub fn node_count(mut self, node_count: usize) -> Self {
        self.config.initial.node_count = node_count;
        self
    }

    /// Set the number of initial-estimate iterations.
    pub fn init_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.initial.max_iterations = max_iterations;
        self
    }

    /// Set the outlier weight of the initial estimate.
    pub fn init_mu(mut self, mu: f64) -> Self {
        self.config.initial.mu = mu;
        self
    }

    /// Set the length of the straight seed line (meters).
    pub fn line_length(mut self, length: f64) -> Self {
        self.config.initial.line_length = length;
        self
    }

    /// Set the starting variance of the initial estimate.
    pub fn initial_variance(mut self, sigma2: f64) -> Self {
        self.config.initial.initial_variance = Some(sigma2);
        self
    }

    /// Set the sort start index.
    pub fn sort_start_index(mut self, start_index: usize) -> Self {
        self.config.sort.start_index = start_index;
        self
    }

    /// Set the maximum link distance between consecutive nodes (meters).
    pub fn max_link_distance(mut self, distance: f64) -> Self {
        self.config.sort.max_link_distance = distance;
        self
    }

    /// Set kernel bandwidth.
    pub fn beta(mut self, beta: f64) -> Self {
        self.config.registration.beta = beta;
        self
    }

    /// Set ridge strength.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.registration.alpha = alpha;
        self
    }

    /// Set LLE neighborhood size.
    pub fn k(mut self, k: usize) -> Self {
        self.config.registration.k = k;
        self
    }

    /// Set smoothness strength.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.config.registration.gamma = gamma;
        self
    }

    /// Set the outlier weight used while tracking.
    pub fn mu(mut self, mu: f64) -> Self {
        self.config.registration.mu = mu;
        self
    }

    /// Set maximum registration iterations per frame.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.registration.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.registration.tolerance = tolerance;
        self
    }

    /// Enable or disable the LLE smoothness term.
    pub fn include_smoothness(mut self, enabled: bool) -> Self {
        self.config.registration.include_smoothness = enabled;
        self
    }

    /// Set the LLE neighbor policy.
    pub fn neighbor_policy(mut self, policy: NeighborPolicy) -> Self {
        self.config.registration.neighbor_policy = policy;
        self
    }

    /// Set the kernel decoupling mode.
    pub fn decoupling(mut self, mode: DecouplingMode) -> Self {
        self.config.registration.decoupling = mode;
        self
    }

    /// Set the cross-segment kernel penalty.
    pub fn segment_penalty(mut self, penalty: f64) -> Self {
        self.config.registration.segment_penalty = penalty;
        self
    }

    /// Keep the variance fixed across frames.
    pub fn carry_over_variance(mut self, enabled: bool) -> Self {
        self.config.registration.carry_over_variance = enabled;
        self
    }

    /// Enable the hard-correspondence term with the given weight.
    pub fn hard_correspondence(mut self, omega: f64) -> Self {
        self.config.registration.hard_correspondence_omega = Some(omega);
        self
    }

    /// Set the minimum number of points per frame.
    pub fn min_points(mut self, min_points: usize) -> Self {
        self.config.initial.min_points = min_points;
        self.config.registration.min_points = min_points;
        self
    }

    /// Record per-iteration diagnostics.
    pub fn collect_debug(mut self, enabled: bool) -> Self {
        self.config.registration.collect_debug = enabled;
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Build the tracking session.
    pub fn build(self) -> Result<TrackingSession> {
        TrackingSession::new(self.config)
    }
}

impl Default for TrackerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of initializing a session.
#[derive(Debug, Clone)]
pub struct InitReport {
    /// Node count of each segment after sorting.
    pub segment_lengths: Vec<usize>,

    /// Whether every segment sorted into a complete chain.
    pub sorted: bool,

    /// Variance carried into the first tracked frame, if known.
    pub sigma2: Option<f64>,
}

/// Outcome of tracking one frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Convergence status.
    pub status: ConvergenceStatus,

    /// Registration iterations performed.
    pub iterations: usize,

    /// Variance after the frame.
    pub sigma2: f64,

    /// Per-iteration diagnostics, empty unless requested.
    pub iteration_debug: Vec<IterationDebug>,
}

/// What [`TrackingSession::process_frame`] did with a frame.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// The frame initialized the session.
    Initialized(InitReport),

    /// The frame was tracked.
    Tracked(FrameResult),
}

/// Cross-frame tracking state for one deformable object.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    config: TrackerConfig,
    estimator: InitialTopologyEstimator,
    engine: CpdLle,
    state: SessionState,
    nodes: Option<NodeSequence>,
    sigma2: Option<f64>,
    layout: SegmentLayout,
}

impl TrackingSession {
    /// Create a session with the given configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if a parameter is out of range.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let estimator = InitialTopologyEstimator::new(config.initial.clone())?;
        let engine = CpdLle::new(config.registration.clone())?;
        Ok(Self {
            config,
            estimator,
            engine,
            state: SessionState::Uninitialized,
            nodes: None,
            sigma2: None,
            layout: SegmentLayout::single(0),
        })
    }

    /// Create a session with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: TrackerConfig::default(),
            estimator: InitialTopologyEstimator::with_defaults(),
            engine: CpdLle::with_defaults(),
            state: SessionState::Uninitialized,
            nodes: None,
            sigma2: None,
            layout: SegmentLayout::single(0),
        }
    }

    /// Create a builder for configuring the session.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::new()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session holds a node sequence.
    pub fn is_initialized(&self) -> bool {
        self.state != SessionState::Uninitialized
    }

    /// Current node sequence.
    pub fn nodes(&self) -> Option<&NodeSequence> {
        self.nodes.as_ref()
    }

    /// Current variance.
    pub fn sigma2(&self) -> Option<f64> {
        self.sigma2
    }

    /// Segment layout of the current node sequence.
    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    /// Current nodes split into one sequence per segment.
    pub fn segments(&self) -> Option<Vec<NodeSequence>> {
        self.nodes
            .as_ref()
            .and_then(|nodes| self.layout.split(nodes).ok())
    }

    /// Initialize from the first frame of a single object.
    ///
    /// Fits `node_count` nodes to the cloud and sorts them into a chain. If
    /// sorting cannot link every node, the partial chain is kept and the
    /// report's `sorted` flag is false.
    ///
    /// # Errors
    /// `DegenerateInput` if the cloud is too small.
    pub fn initialize(&mut self, cloud: &PointCloud) -> Result<InitReport> {
        let estimate = self.estimator.estimate(cloud)?;
        let sorted = sort_path(&estimate.nodes, &self.config.sort)?;
        let report = InitReport {
            segment_lengths: vec![sorted.nodes.len()],
            sorted: sorted.success,
            sigma2: Some(estimate.sigma2),
        };
        self.install(vec![sorted.nodes], Some(estimate.sigma2))?;
        Ok(report)
    }

    /// Initialize from separately segmented clouds, one per object.
    ///
    /// Each segment is estimated with its own node count and sorted on its
    /// own; the sorted chains are concatenated in order. The session variance
    /// is the mean of the segment variances.
    ///
    /// # Errors
    /// `InvalidConfig` if the slices differ in length or are empty;
    /// `DegenerateInput` if a segment cloud is too small.
    pub fn initialize_segments(
        &mut self,
        clouds: &[PointCloud],
        node_counts: &[usize],
    ) -> Result<InitReport> {
        if clouds.is_empty() || clouds.len() != node_counts.len() {
            return Err(TrackingError::InvalidConfig(format!(
                "{} segment clouds for {} node counts",
                clouds.len(),
                node_counts.len()
            )));
        }

        let mut chains = Vec::with_capacity(clouds.len());
        let mut sorted_all = true;
        let mut sigma2_sum = 0.0;
        for (cloud, &node_count) in clouds.iter().zip(node_counts) {
            let config = InitialEstimateConfig {
                node_count,
                ..self.config.initial.clone()
            };
            let estimate = InitialTopologyEstimator::new(config)?.estimate(cloud)?;
            let sorted = sort_path(&estimate.nodes, &self.config.sort)?;
            sorted_all &= sorted.success;
            sigma2_sum += estimate.sigma2;
            chains.push(sorted.nodes);
        }

        let sigma2 = sigma2_sum / clouds.len() as f64;
        let report = InitReport {
            segment_lengths: chains.iter().map(NodeSequence::len).collect(),
            sorted: sorted_all,
            sigma2: Some(sigma2),
        };
        self.install(chains, Some(sigma2))?;
        Ok(report)
    }

    /// Initialize from known node positions, one set per segment.
    ///
    /// Each set is sorted and the chains are concatenated. `sigma2` seeds the
    /// variance for sessions that carry it over.
    ///
    /// # Errors
    /// `DegenerateInput` if a seed set is empty.
    pub fn initialize_from_seeds(
        &mut self,
        seeds: &[NodeSequence],
        sigma2: Option<f64>,
    ) -> Result<InitReport> {
        if seeds.is_empty() {
            return Err(TrackingError::DegenerateInput {
                points: 0,
                required: 1,
            });
        }

        let mut chains = Vec::with_capacity(seeds.len());
        let mut sorted_all = true;
        for seed in seeds {
            let sorted = sort_path(seed, &self.config.sort)?;
            sorted_all &= sorted.success;
            chains.push(sorted.nodes);
        }

        let report = InitReport {
            segment_lengths: chains.iter().map(NodeSequence::len).collect(),
            sorted: sorted_all,
            sigma2,
        };
        self.install(chains, sigma2)?;
        Ok(report)
    }

    fn install(&mut self, chains: Vec<NodeSequence>, sigma2: Option<f64>) -> Result<()> {
        let lengths: Vec<usize> = chains.iter().map(NodeSequence::len).collect();
        self.layout = SegmentLayout::from_lengths(&lengths)?;
        self.nodes = Some(NodeSequence::concat(&chains));
        self.sigma2 = sigma2;
        self.state = SessionState::Initialized;
        info!(
            nodes = self.layout.node_count(),
            segments = self.layout.segment_count(),
            "Tracking session initialized"
        );
        Ok(())
    }

    /// Track one frame.
    ///
    /// On failure the previous nodes and variance are kept and the error is
    /// returned; the next frame is tracked from the last good state.
    ///
    /// # Errors
    /// `NotInitialized` before initialization, otherwise any registration
    /// error.
    pub fn track(&mut self, cloud: &PointCloud) -> Result<FrameResult> {
        let previous = self.nodes.as_ref().ok_or(TrackingError::NotInitialized)?;

        match self.engine.track(cloud, previous, self.sigma2, &self.layout) {
            Ok(result) => {
                self.nodes = Some(result.nodes);
                self.sigma2 = Some(result.sigma2);
                self.state = SessionState::Tracking;
                Ok(FrameResult {
                    status: result.status,
                    iterations: result.iterations,
                    sigma2: result.sigma2,
                    iteration_debug: result.iteration_debug,
                })
            }
            Err(e) => {
                warn!("Registration failed, keeping previous nodes: {e}");
                Err(e)
            }
        }
    }

    /// Initialize on the first frame, track on every later one.
    pub fn process_frame(&mut self, cloud: &PointCloud) -> Result<FrameOutcome> {
        if self.is_initialized() {
            self.track(cloud).map(FrameOutcome::Tracked)
        } else {
            self.initialize(cloud).map(FrameOutcome::Initialized)
        }
    }

    /// Drop all cross-frame state.
    pub fn reset(&mut self) {
        self.state = SessionState::Uninitialized;
        self.nodes = None;
        self.sigma2 = None;
        self.layout = SegmentLayout::single(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        arc_points, jitter, line_points, max_arc_deviation, max_distance_to_points, rotate_z,
        translate,
    };
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    const CENTER: [f64; 3] = [0.3, 0.0, 0.5];

    fn arc_frame(rotation: f64) -> PointCloud {
        let points = arc_points(CENTER, 0.2, FRAC_PI_4, 3.0 * FRAC_PI_4, 200);
        PointCloud::from_points(&rotate_z(&points, CENTER, rotation))
    }

    #[test]
    fn test_lifecycle() {
        let mut session = TrackingSession::builder().node_count(20).build().unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(matches!(
            session.track(&arc_frame(0.0)),
            Err(TrackingError::NotInitialized)
        ));

        let report = match session.process_frame(&arc_frame(0.0)).unwrap() {
            FrameOutcome::Initialized(report) => report,
            other => panic!("expected initialization, got {other:?}"),
        };
        assert!(report.sorted);
        assert_eq!(report.segment_lengths, vec![20]);
        assert_eq!(session.state(), SessionState::Initialized);

        let outcome = session.process_frame(&arc_frame(0.05)).unwrap();
        assert!(matches!(outcome, FrameOutcome::Tracked(_)));
        assert_eq!(session.state(), SessionState::Tracking);
        assert_eq!(session.nodes().unwrap().len(), 20);

        session.reset();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.nodes().is_none());
        assert!(session.sigma2().is_none());
    }

    #[test]
    fn test_failed_frame_keeps_previous_nodes() {
        let mut session = TrackingSession::builder().node_count(20).build().unwrap();
        session.initialize(&arc_frame(0.0)).unwrap();
        let before = session.nodes().unwrap().clone();
        let sigma2 = session.sigma2();

        let sparse = PointCloud::from_points(&[[0.3, 0.2, 0.5]; 3]);
        assert!(matches!(
            session.track(&sparse),
            Err(TrackingError::DegenerateInput { .. })
        ));
        assert_eq!(session.nodes().unwrap(), &before);
        assert_eq!(session.sigma2(), sigma2);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_tracks_rotating_arc() {
        let mut session = TrackingSession::builder().node_count(20).build().unwrap();
        session.initialize(&arc_frame(0.0)).unwrap();

        for step in 1..=3 {
            session.track(&arc_frame(0.03 * step as f64)).unwrap();
        }

        let deviation = max_arc_deviation(session.nodes().unwrap(), CENTER, 0.2);
        assert!(deviation < 0.01, "max deviation {deviation}");
    }

    #[test]
    fn test_seeded_segments() {
        let mut session = TrackingSession::with_defaults();
        let first = NodeSequence::from_points(&line_points([0.0; 3], [0.34, 0.0, 0.0], 18));
        let second = NodeSequence::from_points(&line_points(
            [0.0, 0.1, 0.0],
            [0.24, 0.1, 0.0],
            13,
        ));

        let report = session
            .initialize_from_seeds(&[first, second], Some(1e-4))
            .unwrap();

        assert!(report.sorted);
        assert_eq!(report.segment_lengths, vec![18, 13]);
        assert_eq!(session.layout().boundaries(), &[18]);
        let segments = session.segments().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].len(), 13);
        assert_eq!(session.sigma2(), Some(1e-4));
    }

    #[test]
    fn test_segment_clouds_initialize_and_track() {
        let upper = arc_points(CENTER, 0.2, FRAC_PI_4, 3.0 * FRAC_PI_4, 200);
        let lower = arc_points([0.3, -0.15, 0.5], 0.2, FRAC_PI_4, 3.0 * FRAC_PI_4, 150);
        let clouds = [
            PointCloud::from_points(&upper),
            PointCloud::from_points(&lower),
        ];
        let mut session = TrackingSession::with_defaults();

        let report = session.initialize_segments(&clouds, &[18, 13]).unwrap();

        assert!(report.sorted);
        assert_eq!(report.segment_lengths, vec![18, 13]);
        assert_eq!(session.layout().boundaries(), &[18]);
        assert_eq!(session.state(), SessionState::Initialized);

        let segment_sigma2: Vec<f64> = clouds
            .iter()
            .zip([18, 13])
            .map(|(cloud, node_count)| {
                InitialTopologyEstimator::new(InitialEstimateConfig::with_node_count(node_count))
                    .unwrap()
                    .estimate(cloud)
                    .unwrap()
                    .sigma2
            })
            .collect();
        let mean = (segment_sigma2[0] + segment_sigma2[1]) / 2.0;
        assert_relative_eq!(session.sigma2().unwrap(), mean, max_relative = 1e-12);
        assert_eq!(report.sigma2, session.sigma2());

        // Both wires move 1 cm along x, with sub-millimeter noise.
        let upper_next = jitter(&translate(&upper, [0.01, 0.0, 0.0]), 1e-3, 3);
        let lower_next = jitter(&translate(&lower, [0.01, 0.0, 0.0]), 1e-3, 4);
        let mut points = upper_next.clone();
        points.extend_from_slice(&lower_next);
        session.track(&PointCloud::from_points(&points)).unwrap();

        let segments = session.segments().unwrap();
        assert_eq!(segments[0].len(), 18);
        assert_eq!(segments[1].len(), 13);
        let upper_error = max_distance_to_points(&segments[0], &upper_next);
        let lower_error = max_distance_to_points(&segments[1], &lower_next);
        assert!(upper_error < 0.005, "upper wire error {upper_error}");
        assert!(lower_error < 0.005, "lower wire error {lower_error}");
    }

    #[test]
    fn test_segment_initialization_checks_arguments() {
        let mut session = TrackingSession::with_defaults();
        let cloud = arc_frame(0.0);
        assert!(matches!(
            session.initialize_segments(&[cloud], &[10, 10]),
            Err(TrackingError::InvalidConfig(_))
        ));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(TrackingSession::builder().mu(1.5).build().is_err());
        assert!(TrackingSession::builder().node_count(0).build().is_err());
    }
}
