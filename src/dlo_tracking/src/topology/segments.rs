//! Segment layout for multi-wire tracking.
//!
//! A combined node sequence may hold several wires back to back. The layout
//! records where each wire starts so that:
//! - sequential LLE neighbors are drawn only from the node's own segment,
//! - kernel entries between nodes of different segments are replaced by a
//!   large fixed penalty,
//! - results can be split back into one sequence per wire.
//!
//! The common case is a single boundary splitting two wires (e.g. 18 + 13
//! nodes); any number of boundaries is accepted.

use std::ops::Range;

use nalgebra::DMatrix;

use crate::error::{Result, TrackingError};
use crate::types::NodeSequence;

/// Default coefficient written into cross-segment kernel entries.
pub const DEFAULT_SEGMENT_PENALTY: f64 = 50.0;

/// Partition of `node_count` nodes into contiguous segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    node_count: usize,
    /// Strictly increasing, each in `1..node_count`.
    boundaries: Vec<usize>,
}

impl SegmentLayout {
    /// A single segment covering all nodes.
    pub fn single(node_count: usize) -> Self {
        Self {
            node_count,
            boundaries: Vec::new(),
        }
    }

    /// Two segments split at `boundary`: `[0, boundary)` and `[boundary, node_count)`.
    pub fn with_boundary(node_count: usize, boundary: usize) -> Result<Self> {
        Self::from_boundaries(node_count, vec![boundary])
    }

    /// Segments split at each of `boundaries`.
    ///
    /// Boundaries must be strictly increasing and satisfy `0 < b < node_count`.
    pub fn from_boundaries(node_count: usize, boundaries: Vec<usize>) -> Result<Self> {
        let mut previous = 0;
        for &b in &boundaries {
            if b <= previous || b >= node_count {
                return Err(TrackingError::InvalidConfig(format!(
                    "segment boundary {b} must lie in ({previous}, {node_count})"
                )));
            }
            previous = b;
        }
        Ok(Self {
            node_count,
            boundaries,
        })
    }

    /// Layout for segments of the given lengths, concatenated in order.
    pub fn from_lengths(lengths: &[usize]) -> Result<Self> {
        if lengths.iter().any(|&len| len == 0) {
            return Err(TrackingError::InvalidConfig(
                "segment lengths must be non-zero".to_string(),
            ));
        }
        let node_count = lengths.iter().sum();
        let boundaries = lengths
            .iter()
            .take(lengths.len().saturating_sub(1))
            .scan(0, |acc, len| {
                *acc += len;
                Some(*acc)
            })
            .collect();
        Self::from_boundaries(node_count, boundaries)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Interior boundary indices.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Check if the layout has more than one segment.
    pub fn is_multi_segment(&self) -> bool {
        !self.boundaries.is_empty()
    }

    /// Index ranges of all segments, in order.
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut starts = vec![0];
        starts.extend_from_slice(&self.boundaries);
        let mut ends = self.boundaries.clone();
        ends.push(self.node_count);
        starts.into_iter().zip(ends).map(|(s, e)| s..e).collect()
    }

    /// Range of the segment containing node `index`.
    pub fn segment_of(&self, index: usize) -> Range<usize> {
        let pos = self.boundaries.partition_point(|&b| b <= index);
        let start = if pos == 0 { 0 } else { self.boundaries[pos - 1] };
        let end = self
            .boundaries
            .get(pos)
            .copied()
            .unwrap_or(self.node_count);
        start..end
    }

    /// Check if two nodes belong to the same segment.
    pub fn same_segment(&self, i: usize, j: usize) -> bool {
        self.segment_of(i).contains(&j)
    }

    /// Overwrite every cross-segment entry of an `M × M` matrix with `value`.
    pub fn fill_cross_segment(&self, matrix: &mut DMatrix<f64>, value: f64) {
        if !self.is_multi_segment() {
            return;
        }
        for (a, ra) in self.ranges().iter().enumerate() {
            for (b, rb) in self.ranges().iter().enumerate() {
                if a == b {
                    continue;
                }
                matrix
                    .view_mut((ra.start, rb.start), (ra.len(), rb.len()))
                    .fill(value);
            }
        }
    }

    /// Split a combined sequence into one sequence per segment.
    pub fn split(&self, nodes: &NodeSequence) -> Result<Vec<NodeSequence>> {
        if nodes.len() != self.node_count {
            return Err(TrackingError::NodeCountMismatch {
                expected: self.node_count,
                actual: nodes.len(),
            });
        }
        Ok(self
            .ranges()
            .into_iter()
            .map(|r| nodes.slice(r.start, r.len()))
            .collect())
    }
}
