//! Point cloud and node sequence containers.
//!
//! Both are stored as `rows × 3` matrices of `f64` so the registration math can
//! use them directly. Input points arrive as `[x, y, z]` triples the same way
//! sensor scans do; `f32` and `f64` inputs are both accepted.

use nalgebra::{DMatrix, Vector3};
use tracing::debug;

/// Spatial dimension of all points handled by this crate.
pub const DIM: usize = 3;

/// Unordered set of observed 3-D points for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    points: DMatrix<f64>,
}

impl PointCloud {
    /// Build a cloud from `[x, y, z]` triples.
    ///
    /// Points with a non-finite coordinate are dropped.
    pub fn from_points<T: Copy + Into<f64>>(points: &[[T; 3]]) -> Self {
        let finite: Vec<[f64; 3]> = points
            .iter()
            .map(|p| [p[0].into(), p[1].into(), p[2].into()])
            .filter(|p: &[f64; 3]| p.iter().all(|v| v.is_finite()))
            .collect();

        let dropped = points.len() - finite.len();
        if dropped > 0 {
            debug!("Dropped {dropped} non-finite points from cloud");
        }

        Self {
            points: rows_to_matrix(&finite),
        }
    }

    /// Wrap an existing `N × 3` matrix.
    ///
    /// Returns `None` if the matrix does not have three columns.
    pub fn from_matrix(points: DMatrix<f64>) -> Option<Self> {
        (points.ncols() == DIM).then_some(Self { points })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    /// Check if the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// The underlying `N × 3` matrix.
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.points
    }

    /// Point `i` as a vector.
    pub fn point(&self, i: usize) -> Vector3<f64> {
        row_vector(&self.points, i)
    }

    /// Copy the points out as `[x, y, z]` triples.
    pub fn to_points(&self) -> Vec<[f64; 3]> {
        matrix_to_rows(&self.points)
    }
}

/// Ordered control points along the tracked object.
///
/// Index order encodes physical adjacency. The node count is fixed once a
/// tracking session is initialized.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSequence {
    nodes: DMatrix<f64>,
}

impl NodeSequence {
    /// Build a sequence from `[x, y, z]` triples, keeping their order.
    pub fn from_points<T: Copy + Into<f64>>(points: &[[T; 3]]) -> Self {
        let rows: Vec<[f64; 3]> = points
            .iter()
            .map(|p| [p[0].into(), p[1].into(), p[2].into()])
            .collect();
        Self {
            nodes: rows_to_matrix(&rows),
        }
    }

    /// Build a sequence from vectors, keeping their order.
    pub fn from_vectors(points: &[Vector3<f64>]) -> Self {
        let mut nodes = DMatrix::zeros(points.len(), DIM);
        for (i, p) in points.iter().enumerate() {
            nodes.set_row(i, &p.transpose());
        }
        Self { nodes }
    }

    /// Wrap an existing `M × 3` matrix.
    ///
    /// Returns `None` if the matrix does not have three columns.
    pub fn from_matrix(nodes: DMatrix<f64>) -> Option<Self> {
        (nodes.ncols() == DIM).then_some(Self { nodes })
    }

    /// Concatenate sequences end to end.
    pub fn concat(parts: &[NodeSequence]) -> Self {
        let total: usize = parts.iter().map(NodeSequence::len).sum();
        let mut nodes = DMatrix::zeros(total, DIM);
        let mut offset = 0;
        for part in parts {
            let len = part.len();
            nodes.rows_mut(offset, len).copy_from(&part.nodes);
            offset += len;
        }
        Self { nodes }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.nrows()
    }

    /// Check if the sequence has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.nrows() == 0
    }

    /// Node `i` as a vector.
    pub fn node(&self, i: usize) -> Vector3<f64> {
        row_vector(&self.nodes, i)
    }

    /// The underlying `M × 3` matrix.
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.nodes
    }

    /// Consume the sequence and return its matrix.
    pub fn into_matrix(self) -> DMatrix<f64> {
        self.nodes
    }

    /// Contiguous sub-sequence `[start, start + len)`.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        Self {
            nodes: self.nodes.rows(start, len).clone_owned(),
        }
    }

    /// Copy the nodes out as `[x, y, z]` triples.
    pub fn to_points(&self) -> Vec<[f64; 3]> {
        matrix_to_rows(&self.nodes)
    }

    /// Sum of squared distances between corresponding nodes.
    ///
    /// Both sequences must have the same length.
    pub fn squared_displacement(&self, other: &NodeSequence) -> f64 {
        (&self.nodes - &other.nodes).norm_squared()
    }
}

pub(crate) fn row_vector(m: &DMatrix<f64>, i: usize) -> Vector3<f64> {
    Vector3::new(m[(i, 0)], m[(i, 1)], m[(i, 2)])
}

fn rows_to_matrix(rows: &[[f64; 3]]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), DIM, |i, j| rows[i][j])
}

fn matrix_to_rows(m: &DMatrix<f64>) -> Vec<[f64; 3]> {
    (0..m.nrows())
        .map(|i| [m[(i, 0)], m[(i, 1)], m[(i, 2)]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_drops_non_finite_points() {
        let cloud = PointCloud::from_points(&[
            [0.0f32, 0.0, 0.0],
            [f32::NAN, 1.0, 1.0],
            [1.0, f32::INFINITY, 0.0],
            [1.0, 2.0, 3.0],
        ]);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(1), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = PointCloud::from_points::<f64>(&[]);
        assert!(cloud.is_empty());
        assert_eq!(cloud.as_matrix().ncols(), DIM);
    }

    #[test]
    fn test_from_matrix_rejects_wrong_width() {
        assert!(PointCloud::from_matrix(DMatrix::zeros(4, 2)).is_none());
        assert!(NodeSequence::from_matrix(DMatrix::zeros(4, 3)).is_some());
    }

    #[test]
    fn test_concat_and_slice() {
        let a = NodeSequence::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let b = NodeSequence::from_points(&[[5.0, 0.0, 0.0]]);
        let joined = NodeSequence::concat(&[a.clone(), b.clone()]);

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.slice(0, 2), a);
        assert_eq!(joined.slice(2, 1), b);
    }

    #[test]
    fn test_squared_displacement() {
        let a = NodeSequence::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let b = NodeSequence::from_points(&[[0.0, 1.0, 0.0], [1.0, 0.0, 2.0]]);
        assert_eq!(a.squared_displacement(&b), 5.0);
    }
}
