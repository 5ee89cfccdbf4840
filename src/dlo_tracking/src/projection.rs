//! Projection of tracked nodes into the camera image.
//!
//! Nodes are mapped with a 3×4 projection matrix `P`: `[x, y, z]ᵀ = P·[X, Y, Z, 1]ᵀ`,
//! pixel `u = x / z`, `v = y / z`, truncated toward zero. An overlay connects
//! consecutive nodes of the same segment; no edge crosses a segment boundary.

use nalgebra::{Matrix3x4, Vector4};

use crate::topology::SegmentLayout;
use crate::types::NodeSequence;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        // RealSense D435 color stream, 1280x720
        Self {
            fx: 918.359,
            fy: 916.266,
            cx: 645.891,
            cy: 354.024,
        }
    }
}

/// A projected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelNode {
    /// Index of the node in the combined sequence.
    pub index: usize,
    pub u: i64,
    pub v: i64,
}

/// Projected nodes and the edges to draw between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    /// Nodes in front of the camera, in sequence order.
    pub nodes: Vec<PixelNode>,

    /// Pixel line segments between consecutive visible nodes of one segment.
    pub edges: Vec<((i64, i64), (i64, i64))>,
}

/// Camera projection for overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraProjection {
    matrix: Matrix3x4<f64>,
}

impl Default for CameraProjection {
    fn default() -> Self {
        Self::from_intrinsics(&CameraIntrinsics::default())
    }
}

impl CameraProjection {
    /// Wrap a 3×4 projection matrix.
    pub fn new(matrix: Matrix3x4<f64>) -> Self {
        Self { matrix }
    }

    /// Projection `[K | 0]` for nodes already in the camera frame.
    pub fn from_intrinsics(k: &CameraIntrinsics) -> Self {
        #[rustfmt::skip]
        let matrix = Matrix3x4::new(
            k.fx, 0.0,  k.cx, 0.0,
            0.0,  k.fy, k.cy, 0.0,
            0.0,  0.0,  1.0,  0.0,
        );
        Self { matrix }
    }

    /// Build from 12 row-major values.
    pub fn from_row_slice(values: &[f64; 12]) -> Self {
        Self {
            matrix: Matrix3x4::from_row_slice(values),
        }
    }

    /// The projection matrix.
    pub fn matrix(&self) -> &Matrix3x4<f64> {
        &self.matrix
    }

    /// Project one point. Returns `None` when the point is not in front of
    /// the camera.
    pub fn project_point(&self, point: &[f64; 3]) -> Option<(i64, i64)> {
        let h = self.matrix * Vector4::new(point[0], point[1], point[2], 1.0);
        if !(h.z > 0.0) {
            return None;
        }
        let u = (h.x / h.z).trunc();
        let v = (h.y / h.z).trunc();
        (u.is_finite() && v.is_finite()).then_some((u as i64, v as i64))
    }

    /// Project every visible node.
    pub fn project_nodes(&self, nodes: &NodeSequence) -> Vec<PixelNode> {
        nodes
            .to_points()
            .iter()
            .enumerate()
            .filter_map(|(index, p)| {
                self.project_point(p)
                    .map(|(u, v)| PixelNode { index, u, v })
            })
            .collect()
    }

    /// Project nodes and connect consecutive ones within each segment.
    ///
    /// An edge is drawn only between index neighbors `i` and `i + 1` that are
    /// both visible and in the same segment of `layout`.
    pub fn overlay(&self, nodes: &NodeSequence, layout: &SegmentLayout) -> Overlay {
        let projected = self.project_nodes(nodes);
        let edges = projected
            .windows(2)
            .filter(|w| {
                w[1].index == w[0].index + 1 && layout.same_segment(w[0].index, w[1].index)
            })
            .map(|w| ((w[0].u, w[0].v), (w[1].u, w[1].v)))
            .collect();
        Overlay {
            nodes: projected,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_optical_axis_to_principal_point() {
        let camera = CameraProjection::default();
        assert_eq!(camera.project_point(&[0.0, 0.0, 0.5]), Some((645, 354)));
    }

    #[test]
    fn test_truncates_toward_zero() {
        let camera = CameraProjection::from_intrinsics(&CameraIntrinsics {
            fx: 100.0,
            fy: 100.0,
            cx: 0.0,
            cy: 0.0,
        });
        // u = 100 · (-0.0157) / 1 = -1.57 -> -1
        assert_eq!(camera.project_point(&[-0.0157, 0.0257, 1.0]), Some((-1, 2)));
    }

    #[test]
    fn test_skips_points_behind_camera() {
        let camera = CameraProjection::default();
        assert_eq!(camera.project_point(&[0.1, 0.1, 0.0]), None);
        assert_eq!(camera.project_point(&[0.1, 0.1, -1.0]), None);
    }

    #[test]
    fn test_overlay_never_crosses_segments() {
        let camera = CameraProjection::default();
        let points: Vec<[f64; 3]> = (0..6).map(|i| [0.01 * i as f64, 0.0, 0.5]).collect();
        let nodes = NodeSequence::from_points(&points);
        let layout = SegmentLayout::with_boundary(6, 3).unwrap();

        let overlay = camera.overlay(&nodes, &layout);

        assert_eq!(overlay.nodes.len(), 6);
        // 0-1, 1-2, 3-4, 4-5
        assert_eq!(overlay.edges.len(), 4);
        let (a, b) = (overlay.nodes[2], overlay.nodes[3]);
        assert!(!overlay.edges.contains(&((a.u, a.v), (b.u, b.v))));
    }

    #[test]
    fn test_overlay_skips_hidden_nodes() {
        let camera = CameraProjection::default();
        let nodes = NodeSequence::from_points(&[
            [0.0, 0.0, 0.5],
            [0.01, 0.0, -0.5],
            [0.02, 0.0, 0.5],
        ]);
        let overlay = camera.overlay(&nodes, &SegmentLayout::single(3));

        assert_eq!(overlay.nodes.len(), 2);
        assert!(overlay.edges.is_empty());
    }
}
