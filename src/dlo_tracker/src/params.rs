//! DLO tracker parameters

use anyhow::{Context, Result};
use dlo_tracking::topology::{DEFAULT_MAX_LINK_DISTANCE, DEFAULT_SEGMENT_PENALTY};
use dlo_tracking::{
    CameraIntrinsics, CameraProjection, DecouplingMode, NeighborPolicy, NodeSequence,
    TrackerConfig, TrackerConfigBuilder,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// First-frame topology estimate
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializationParams {
    pub node_count: usize,
    pub max_iterations: usize,
    pub mu: f64,
    /// Length of the straight seed line (meters)
    pub line_length: f64,
    /// Starting variance (None = estimated from the cloud)
    pub initial_variance: Option<f64>,
}

impl Default for InitializationParams {
    fn default() -> Self {
        Self {
            node_count: 35,
            max_iterations: 50,
            mu: 0.05,
            line_length: 0.1,
            initial_variance: None,
        }
    }
}

/// Kernel decoupling kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecouplingKind {
    #[default]
    Disabled,
    IndexDistance,
    Normalized,
}

/// Kernel decoupling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecouplingParams {
    pub mode: DecouplingKind,
    /// Per-index step for `index_distance`
    pub scale: f64,
    /// Range for `normalized`
    pub min: f64,
    pub max: f64,
}

impl Default for DecouplingParams {
    fn default() -> Self {
        Self {
            mode: DecouplingKind::Disabled,
            scale: 0.02,
            min: 1.0,
            max: 1.0003_f64.powi(3),
        }
    }
}

impl DecouplingParams {
    pub fn to_mode(&self) -> DecouplingMode {
        match self.mode {
            DecouplingKind::Disabled => DecouplingMode::Disabled,
            DecouplingKind::IndexDistance => DecouplingMode::IndexDistance { scale: self.scale },
            DecouplingKind::Normalized => DecouplingMode::Normalized {
                min: self.min,
                max: self.max,
            },
        }
    }
}

/// CPD-LLE registration configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    pub beta: f64,
    pub alpha: f64,
    pub k: usize,
    pub gamma: f64,
    pub mu: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub include_smoothness: bool,
    pub neighbor_policy: NeighborPolicy,
    pub carry_over_variance: bool,
    /// Hard-correspondence weight (None = term disabled)
    pub hard_correspondence_omega: Option<f64>,
    pub min_points: usize,
    pub collect_debug: bool,
    pub decoupling: DecouplingParams,
}

impl Default for RegistrationParams {
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
            carry_over_variance: false,
            hard_correspondence_omega: None,
            min_points: 10,
            collect_debug: false,
            decoupling: DecouplingParams::default(),
        }
    }
}

/// Path sorting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingParams {
    pub start_index: usize,
    pub max_link_distance: f64,
}

impl Default for SortingParams {
    fn default() -> Self {
        Self {
            start_index: 0,
            max_link_distance: DEFAULT_MAX_LINK_DISTANCE,
        }
    }
}

/// Multi-wire configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentsParams {
    /// Calibrated seed nodes, one list per wire. Empty = estimate a single
    /// wire from the first frame.
    pub seeds: Vec<Vec<[f64; 3]>>,
    /// Variance installed together with the seeds
    pub seed_variance: Option<f64>,
    /// Kernel coefficient between nodes of different wires
    pub penalty: f64,
}

impl Default for SegmentsParams {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            seed_variance: None,
            penalty: DEFAULT_SEGMENT_PENALTY,
        }
    }
}

impl SegmentsParams {
    pub fn seed_sequences(&self) -> Vec<NodeSequence> {
        self.seeds
            .iter()
            .map(|points| NodeSequence::from_points(points))
            .collect()
    }
}

/// Camera projection for pixel overlays
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub enabled: bool,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Full 3x4 projection matrix, row-major. Overrides the intrinsics.
    pub projection: Option<[f64; 12]>,
}

impl Default for CameraParams {
    fn default() -> Self {
        let k = CameraIntrinsics::default();
        Self {
            enabled: false,
            fx: k.fx,
            fy: k.fy,
            cx: k.cx,
            cy: k.cy,
            projection: None,
        }
    }
}

impl CameraParams {
    /// Projection to use, or `None` when overlays are disabled.
    pub fn to_projection(&self) -> Option<CameraProjection> {
        if !self.enabled {
            return None;
        }
        Some(match &self.projection {
            Some(values) => CameraProjection::from_row_slice(values),
            None => CameraProjection::from_intrinsics(&CameraIntrinsics {
                fx: self.fx,
                fy: self.fy,
                cx: self.cx,
                cy: self.cy,
            }),
        })
    }
}

/// Frame input configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IoParams {
    /// Extension of frame files in the input directory
    pub frame_extension: String,
    /// Stop after this many frames (0 = all)
    pub max_frames: usize,
}

impl Default for IoParams {
    fn default() -> Self {
        Self {
            frame_extension: "txt".to_string(),
            max_frames: 0,
        }
    }
}

/// All tracker parameters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub initialization: InitializationParams,
    pub registration: RegistrationParams,
    pub sorting: SortingParams,
    pub segments: SegmentsParams,
    pub camera: CameraParams,
    pub io: IoParams,
}

impl TrackerParams {
    /// Load parameters from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameters from {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse parameters in {}", path.display()))
    }

    /// Parse from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Session configuration for the library
    pub fn to_tracker_config(&self) -> TrackerConfig {
        let init = &self.initialization;
        let reg = &self.registration;

        let mut builder = TrackerConfigBuilder::new()
            .node_count(init.node_count)
            .init_max_iterations(init.max_iterations)
            .init_mu(init.mu)
            .line_length(init.line_length)
            .sort_start_index(self.sorting.start_index)
            .max_link_distance(self.sorting.max_link_distance)
            .beta(reg.beta)
            .alpha(reg.alpha)
            .k(reg.k)
            .gamma(reg.gamma)
            .mu(reg.mu)
            .max_iterations(reg.max_iterations)
            .tolerance(reg.tolerance)
            .include_smoothness(reg.include_smoothness)
            .neighbor_policy(reg.neighbor_policy)
            .decoupling(reg.decoupling.to_mode())
            .segment_penalty(self.segments.penalty)
            .carry_over_variance(reg.carry_over_variance)
            .min_points(reg.min_points)
            .collect_debug(reg.collect_debug);

        if let Some(sigma2) = init.initial_variance {
            builder = builder.initial_variance(sigma2);
        }
        if let Some(omega) = reg.hard_correspondence_omega {
            builder = builder.hard_correspondence(omega);
        }

        builder.config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let params = TrackerParams::from_yaml("{}").unwrap();
        let config = params.to_tracker_config();

        assert_eq!(config.initial.node_count, 35);
        assert_eq!(config.registration.k, 6);
        assert_eq!(config.registration.max_iterations, 30);
        assert_eq!(config.sort.max_link_distance, 0.07);
        assert_eq!(config.registration.decoupling, DecouplingMode::Disabled);
        assert!(params.camera.to_projection().is_none());
        assert!(params.segments.seeds.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
registration:
  beta: 1.5
  neighbor_policy: geometric
  hard_correspondence_omega: 1.0e-7
  decoupling:
    mode: index_distance
    scale: 0.05
sorting:
  max_link_distance: 0.08
camera:
  enabled: true
"#;
        let params = TrackerParams::from_yaml(yaml).unwrap();
        let config = params.to_tracker_config();

        assert_eq!(config.registration.beta, 1.5);
        assert_eq!(config.registration.alpha, 1.0);
        assert_eq!(config.registration.neighbor_policy, NeighborPolicy::Geometric);
        assert_eq!(config.registration.hard_correspondence_omega, Some(1e-7));
        assert_eq!(
            config.registration.decoupling,
            DecouplingMode::IndexDistance { scale: 0.05 }
        );
        assert_eq!(config.sort.max_link_distance, 0.08);
        assert!(params.camera.to_projection().is_some());
    }

    #[test]
    fn test_seed_segments() {
        let yaml = r#"
segments:
  seeds:
    - [[0.0, 0.0, 0.5], [0.02, 0.0, 0.5]]
    - [[0.0, 0.1, 0.5], [0.02, 0.1, 0.5], [0.04, 0.1, 0.5]]
  seed_variance: 1.0e-4
"#;
        let params = TrackerParams::from_yaml(yaml).unwrap();
        let seeds = params.segments.seed_sequences();

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].len(), 3);
        assert_eq!(params.segments.seed_variance, Some(1e-4));
        assert_eq!(params.segments.penalty, 50.0);
    }

    #[test]
    fn test_projection_matrix_overrides_intrinsics() {
        let yaml = r#"
camera:
  enabled: true
  projection: [100.0, 0.0, 10.0, 0.0, 0.0, 100.0, 20.0, 0.0, 0.0, 0.0, 1.0, 0.0]
"#;
        let params = TrackerParams::from_yaml(yaml).unwrap();
        let camera = params.camera.to_projection().unwrap();
        assert_eq!(camera.project_point(&[0.0, 0.0, 1.0]), Some((10, 20)));
    }

    #[test]
    fn test_unknown_decoupling_mode_rejected() {
        let yaml = "registration:\n  decoupling:\n    mode: sideways\n";
        assert!(TrackerParams::from_yaml(yaml).is_err());
    }
}
