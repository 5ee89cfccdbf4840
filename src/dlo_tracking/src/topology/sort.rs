//! Greedy path sorting of unordered nodes.
//!
//! Turns an unordered cluster of node positions into a sequentially connected
//! chain:
//! 1. Seed the chain with the start point and its nearest neighbor.
//! 2. Look for an "opposite" neighbor of the start point (nearest remaining
//!    point on the other side, within the link distance). If there is none the
//!    start point is an end of the object; otherwise it is interior and the
//!    chain must also grow from the front.
//! 3. Grow from the tail: repeatedly take the nearest remaining point whose
//!    offset from the tail points away from the previous node.
//! 4. For an interior start, grow from the front the same way.
//!
//! The input must describe a single simple path. Branching or disconnected
//! input is not detected as such; it shows up as an incomplete chain with
//! `success == false`.

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::error::{Result, TrackingError};
use crate::types::NodeSequence;

/// Default maximum distance between consecutive nodes (meters).
pub const DEFAULT_MAX_LINK_DISTANCE: f64 = 0.07;

/// Configuration for path sorting.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Index of the node the chain is grown from. Any node works; it does not
    /// need to be an end of the object.
    pub start_index: usize,

    /// Candidates farther than this from the current chain end are never linked.
    pub max_link_distance: f64,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            start_index: 0,
            max_link_distance: DEFAULT_MAX_LINK_DISTANCE,
        }
    }
}

/// Result of path sorting.
#[derive(Debug, Clone)]
pub struct SortResult {
    /// Ordered nodes. Shorter than the input when `success` is false.
    pub nodes: NodeSequence,

    /// Input index of each output node.
    pub order: Vec<usize>,

    /// Whether every input node was linked into the chain.
    pub success: bool,
}

/// Pool of candidate indices with O(1) removal that preserves input order
/// for first-index-wins tie breaking.
struct CandidatePool {
    available: Vec<bool>,
    remaining: usize,
}

impl CandidatePool {
    fn new(len: usize) -> Self {
        Self {
            available: vec![true; len],
            remaining: len,
        }
    }

    fn take(&mut self, index: usize) {
        if std::mem::replace(&mut self.available[index], false) {
            self.remaining -= 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.available
            .iter()
            .enumerate()
            .filter_map(|(i, &free)| free.then_some(i))
    }
}

/// Nearest remaining point to `points[from]`, first index wins on ties.
fn nearest(points: &[Vector3<f64>], pool: &CandidatePool, from: usize) -> Option<usize> {
    let origin = points[from];
    let mut best: Option<(usize, f64)> = None;
    for j in pool.indices() {
        let d = (points[j] - origin).norm_squared();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((j, d));
        }
    }
    best.map(|(j, _)| j)
}

/// Nearest remaining point on the far side of `points[from]` relative to
/// `points[behind]`, within the link distance.
fn nearest_opposite(
    points: &[Vector3<f64>],
    pool: &CandidatePool,
    from: usize,
    behind: usize,
    max_link_distance_sq: f64,
) -> Option<usize> {
    let origin = points[from];
    let back = points[behind] - origin;
    let mut best: Option<(usize, f64)> = None;
    for j in pool.indices() {
        let offset = points[j] - origin;
        let d = offset.norm_squared();
        if offset.dot(&back) < 0.0
            && d < max_link_distance_sq
            && best.map_or(true, |(_, bd)| d < bd)
        {
            best = Some((j, d));
        }
    }
    best.map(|(j, _)| j)
}

/// Order `nodes` into a connected path starting from `config.start_index`.
///
/// # Returns
/// The ordered chain and a success flag. On failure the chain holds every node
/// that could be linked before growth stopped.
///
/// # Errors
/// `DegenerateInput` for an empty input, `InvalidConfig` if the start index is
/// out of range.
pub fn sort_path(nodes: &NodeSequence, config: &SortConfig) -> Result<SortResult> {
    let n = nodes.len();
    if n == 0 {
        return Err(TrackingError::DegenerateInput {
            points: 0,
            required: 1,
        });
    }
    if config.start_index >= n {
        return Err(TrackingError::InvalidConfig(format!(
            "sort start index {} out of range for {n} nodes",
            config.start_index
        )));
    }

    let points: Vec<Vector3<f64>> = (0..n).map(|i| nodes.node(i)).collect();
    let max_link_sq = config.max_link_distance * config.max_link_distance;
    let start = config.start_index;

    let mut pool = CandidatePool::new(n);
    pool.take(start);
    let mut order = std::collections::VecDeque::with_capacity(n);
    order.push_back(start);

    if let Some(first) = nearest(&points, &pool, start) {
        pool.take(first);
        order.push_back(first);

        let interior = nearest_opposite(&points, &pool, start, first, max_link_sq).is_some();
        debug!(start, interior, "Sorting {n} nodes");

        // Grow from the tail.
        while !pool.is_empty() {
            let tail = order[order.len() - 1];
            let behind = order[order.len() - 2];
            match nearest_opposite(&points, &pool, tail, behind, max_link_sq) {
                Some(next) => {
                    pool.take(next);
                    order.push_back(next);
                }
                None => break,
            }
        }

        // Grow from the front.
        if interior {
            while !pool.is_empty() {
                let head = order[0];
                let behind = order[1];
                match nearest_opposite(&points, &pool, head, behind, max_link_sq) {
                    Some(next) => {
                        pool.take(next);
                        order.push_front(next);
                    }
                    None => break,
                }
            }
        }
    }

    let success = pool.is_empty();
    if !success {
        warn!(
            "Path sorting linked {} of {n} nodes; no continuation within {:.3} m",
            order.len(),
            config.max_link_distance
        );
    }

    let order: Vec<usize> = order.into_iter().collect();
    let sorted: Vec<Vector3<f64>> = order.iter().map(|&i| points[i]).collect();

    Ok(SortResult {
        nodes: NodeSequence::from_vectors(&sorted),
        order,
        success,
    })
}
