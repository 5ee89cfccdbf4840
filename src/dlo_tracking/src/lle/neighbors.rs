//! Neighbor selection for LLE weights.
//!
//! Two policies:
//! - [`NeighborPolicy::Geometric`]: the `k` nearest nodes in space, found with
//!   a KD-tree over the node positions and limited to the node's segment.
//! - [`NeighborPolicy::Sequential`]: `k / 2` nodes on each side in index order,
//!   restricted to the node's own segment. Near a segment end the missing
//!   side's quota is taken from the other side, so every row keeps exactly `k`
//!   neighbors unless the segment has fewer than `k + 1` nodes.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use serde::{Deserialize, Serialize};

use crate::topology::SegmentLayout;
use crate::types::NodeSequence;

/// Bucket size for the node KD-tree.
///
/// Node sets are small and often nearly collinear, so a large bucket avoids
/// splitting on a degenerate axis.
const BUCKET_SIZE: usize = 256;

/// How LLE neighbors are chosen for each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborPolicy {
    /// k nearest neighbors in Euclidean space.
    Geometric,
    /// k/2 preceding and k/2 following nodes in index order.
    #[default]
    Sequential,
}

/// KD-tree over node positions for k-nearest-neighbor queries.
#[derive(Debug)]
pub struct NodeSearch {
    /// Generic args: A=f64 (coordinate type), T=u64 (item/index type), K=3 (dimensions), B=bucket size
    kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE>,
}

impl NodeSearch {
    /// Build a search index over the nodes.
    ///
    /// Returns `None` if there are no nodes.
    pub fn from_nodes(nodes: &NodeSequence) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }
        let positions = nodes.to_points();
        // The item value (u64) is the row index of the node.
        let kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE> = (&*positions).into();
        Some(Self { kdtree })
    }

    /// Indices of the `k` nearest nodes to node `index`, excluding itself,
    /// nearest first.
    pub fn nearest_excluding(&self, nodes: &NodeSequence, index: usize, k: usize) -> Vec<usize> {
        self.query(nodes, index, k + 1, k, |_| true)
    }

    /// Like [`Self::nearest_excluding`], restricted to nodes in the same
    /// segment as `index`.
    pub fn nearest_in_segment(
        &self,
        nodes: &NodeSequence,
        layout: &SegmentLayout,
        index: usize,
        k: usize,
    ) -> Vec<usize> {
        if !layout.is_multi_segment() {
            return self.nearest_excluding(nodes, index, k);
        }
        // Other segments may be closer, so rank every node.
        self.query(nodes, index, self.len(), k, |j| layout.same_segment(index, j))
    }

    fn query(
        &self,
        nodes: &NodeSequence,
        index: usize,
        qty: usize,
        k: usize,
        keep: impl Fn(usize) -> bool,
    ) -> Vec<usize> {
        let p = nodes.node(index);
        let query = [p.x, p.y, p.z];
        self.kdtree
            .nearest_n::<SquaredEuclidean>(&query, qty)
            .into_iter()
            .map(|nn| nn.item as usize)
            .filter(|&j| j != index && keep(j))
            .take(k)
            .collect()
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}

/// Sequential neighbors of `index` within its segment.
///
/// Takes `k / 2` indices on each side; where one side runs into the segment
/// end, the shortfall is drawn from the other side. Segments with at most `k`
/// other members return all of them.
pub fn sequential_neighbors(layout: &SegmentLayout, index: usize, k: usize) -> Vec<usize> {
    let segment = layout.segment_of(index);
    let half = k / 2;

    let available_before = index - segment.start;
    let available_after = segment.end - 1 - index;

    let mut before = half.min(available_before);
    let mut after = half.min(available_after);
    if before < half {
        after = (after + half - before).min(available_after);
    }
    if after < half {
        before = (before + half - after).min(available_before);
    }

    (index - before..index)
        .chain(index + 1..=index + after)
        .collect()
}

/// Neighbor lists for every node under the given policy.
pub fn select_neighbors(
    nodes: &NodeSequence,
    k: usize,
    policy: NeighborPolicy,
    layout: &SegmentLayout,
) -> Vec<Vec<usize>> {
    match policy {
        NeighborPolicy::Sequential => (0..nodes.len())
            .map(|i| sequential_neighbors(layout, i, k))
            .collect(),
        NeighborPolicy::Geometric => match NodeSearch::from_nodes(nodes) {
            Some(search) => (0..nodes.len())
                .map(|i| search.nearest_in_segment(nodes, layout, i, k))
                .collect(),
            None => Vec::new(),
        },
    }
}
