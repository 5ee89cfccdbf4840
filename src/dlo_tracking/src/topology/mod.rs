//! Node topology: path ordering and multi-segment layout.

pub mod segments;
pub mod sort;

pub use segments::{SegmentLayout, DEFAULT_SEGMENT_PENALTY};
pub use sort::{sort_path, SortConfig, SortResult, DEFAULT_MAX_LINK_DISTANCE};
