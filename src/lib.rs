//! # knn-core
//!
//! Exact k-nearest-neighbor and radius queries over static point sets in
//! metric spaces of low to moderate dimensionality.
//!
//! An index is built once from a set of points, a payload per point, and a
//! metric, and is read-only afterwards. Three interchangeable backends
//! answer the same queries:
//!
//! - **KdTree**: balanced level-order k-d tree with branch-and-bound
//!   hyper-rectangle pruning (good general-purpose default)
//! - **Grid**: uniform voxel grid with layered shell enumeration per metric
//!   (near-constant queries on dense, well-distributed, low-d data)
//! - **Linear**: exhaustive scan (baseline and correctness oracle)
//!
//! A fourth, **Ensemble**, races the backends on OS threads and returns the
//! first completed result, bounding worst-case latency at the cost of extra
//! work.
//!
//! ## Example
//!
//! ```rust
//! use knn_core::{Backend, Index, IndexOptions, Metric, SpatialIndex};
//!
//! let points = vec![
//!     vec![7.0, 2.0], vec![5.0, 4.0], vec![2.0, 3.0],
//!     vec![4.0, 7.0], vec![9.0, 6.0], vec![8.0, 1.0],
//! ];
//! let payloads = vec!["A", "B", "C", "D", "E", "F"];
//!
//! let options = IndexOptions::with_metric(Metric::Euclidean);
//! let index = Index::build(Backend::KdTree, points, payloads, options).unwrap();
//!
//! let best = index.nearest(&[9.0, 2.0]).unwrap();
//! assert_eq!(*best.payload, "F");
//! assert_eq!(best.point, &[8.0, 1.0]);
//! // Euclidean distances are squared: (9-8)^2 + (2-1)^2
//! assert_eq!(best.distance, 2.0);
//! ```
//!
//! ## Distance conventions
//!
//! The Euclidean metric returns *squared* distances and never takes a square
//! root; radii passed to [`SpatialIndex::within_radius`] are un-squared for
//! Euclidean and are squared exactly once internally. Manhattan, Chebyshev,
//! and cosine distances are returned as-is.

pub mod bounded;
pub mod index;
pub mod metric;
pub mod rect;
pub mod scalar;
pub mod select;

pub use bounded::BoundedPriorityList;
pub use index::ensemble::Ensemble;
pub use index::grid::GridIndex;
pub use index::kdtree::KdTree;
pub use index::linear::LinearIndex;
pub use index::{Backend, Index, IndexOptions, SpatialIndex};
pub use metric::Metric;
pub use rect::HyperRect;
pub use scalar::Scalar;

/// A single query match: the stored point, its payload, and its distance
/// from the query under the index's metric (squared for Euclidean).
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a, T, P> {
    pub point: &'a [T],
    pub payload: &'a P,
    pub distance: f64,
}

/// Error types for index construction and queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KnnError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("payload count {payloads} does not match point count {points}")]
    PayloadCountMismatch { points: usize, payloads: usize },

    #[error("empty input")]
    EmptyInput,

    #[error("{0} metric is not supported by the grid index")]
    GridUnsupportedMetric(Metric),
}

pub type Result<T> = std::result::Result<T, KnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = KnnError::DimensionMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3, got 2");

        let err = KnnError::GridUnsupportedMetric(Metric::Cosine);
        assert_eq!(err.to_string(), "cosine metric is not supported by the grid index");
    }
}
