//! Index backends and the shared query surface.
//!
//! Every backend answers the same three query kinds against an immutable
//! point set built once up front:
//!
//! - `KdTree`: balanced k-d tree, branch-and-bound traversal
//! - `Grid`: uniform voxel grid, layered shell enumeration
//! - `Linear`: exhaustive scan (correctness oracle)
//! - `Ensemble`: races the others and returns the first result

pub mod ensemble;
pub mod grid;
pub mod kdtree;
pub mod linear;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::metric::Metric;
use crate::scalar::Scalar;
use crate::{KnnError, Neighbor, Result};

use ensemble::Ensemble;
use grid::GridIndex;
use kdtree::KdTree;
use linear::LinearIndex;

/// The uniform query surface shared by every index backend.
///
/// All query methods take `&self` and keep their working state local, so
/// concurrent queries against one index are safe.
pub trait SpatialIndex<T: Scalar, P> {
    /// Dimensionality shared by every stored point.
    fn dims(&self) -> usize;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The metric this index was built with.
    fn metric(&self) -> Metric;

    /// Iterate every stored `(point, payload)` pair; order is unspecified.
    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [T], &'a P)> + 'a>;

    /// The single closest entry to `query`.
    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>>;

    /// The `k` closest entries to `query`, ascending by distance.
    ///
    /// `k == 0` and `k ≥ len` both degrade to returning every entry
    /// (sorted ascending).
    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>>;

    /// Entries within `radius` of `query`, ascending by distance, capped at
    /// `k` entries when given. The radius is un-squared for Euclidean (it is
    /// squared exactly once internally); a negative radius yields an empty
    /// result.
    fn within_radius(
        &self,
        query: &[T],
        radius: f64,
        k: Option<usize>,
    ) -> Result<Vec<Neighbor<'_, T, P>>>;
}

/// Build-time options shared by every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOptions<T> {
    /// Distance function the index answers queries under.
    pub metric: Metric,
    /// Lower sentinel for the root hyper-rect; the scalar's typed minimum
    /// when absent.
    pub dimension_min: Option<T>,
    /// Upper sentinel for the root hyper-rect; the scalar's typed maximum
    /// when absent.
    pub dimension_max: Option<T>,
    /// Whether the ensemble also runs the linear backend.
    pub ensemble_linear: bool,
}

impl<T> Default for IndexOptions<T> {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            dimension_min: None,
            dimension_max: None,
            ensemble_linear: false,
        }
    }
}

impl<T: Scalar> IndexOptions<T> {
    pub fn with_metric(metric: Metric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    pub(crate) fn sentinel_lo(&self) -> T {
        self.dimension_min.unwrap_or_else(T::min_value)
    }

    pub(crate) fn sentinel_hi(&self) -> T {
        self.dimension_max.unwrap_or_else(T::max_value)
    }
}

/// Backend selector for [`Index::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    KdTree,
    Grid,
    Linear,
    Ensemble,
}

/// An index of any backend behind one concrete type.
#[derive(Debug)]
pub enum Index<T: Scalar, P> {
    KdTree(KdTree<T, P>),
    Grid(GridIndex<T, P>),
    Linear(LinearIndex<T, P>),
    Ensemble(Ensemble<T, P>),
}

impl<T: Scalar, P> Index<T, P> {
    /// Build an index of the chosen backend over `points` and their 1:1
    /// `payloads`.
    pub fn build(
        backend: Backend,
        points: Vec<Vec<T>>,
        payloads: Vec<P>,
        options: IndexOptions<T>,
    ) -> Result<Self> {
        match backend {
            Backend::KdTree => KdTree::build(points, payloads, options).map(Index::KdTree),
            Backend::Grid => GridIndex::build(points, payloads, options).map(Index::Grid),
            Backend::Linear => LinearIndex::build(points, payloads, options).map(Index::Linear),
            Backend::Ensemble => Ensemble::build(points, payloads, options).map(Index::Ensemble),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Index::KdTree(_) => Backend::KdTree,
            Index::Grid(_) => Backend::Grid,
            Index::Linear(_) => Backend::Linear,
            Index::Ensemble(_) => Backend::Ensemble,
        }
    }
}

impl<T: Scalar, P: Sync> Index<T, P> {
    /// Answer many k-NN queries in parallel, one result per query in input
    /// order.
    pub fn nearest_k_batch(
        &self,
        queries: &[Vec<T>],
        k: usize,
    ) -> Result<Vec<Vec<Neighbor<'_, T, P>>>> {
        use rayon::prelude::*;

        queries
            .par_iter()
            .map(|query| self.nearest_k(query, k))
            .collect()
    }
}

impl<T: Scalar, P> SpatialIndex<T, P> for Index<T, P> {
    fn dims(&self) -> usize {
        match self {
            Index::KdTree(idx) => idx.dims(),
            Index::Grid(idx) => idx.dims(),
            Index::Linear(idx) => idx.dims(),
            Index::Ensemble(idx) => idx.dims(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Index::KdTree(idx) => idx.len(),
            Index::Grid(idx) => idx.len(),
            Index::Linear(idx) => idx.len(),
            Index::Ensemble(idx) => idx.len(),
        }
    }

    fn metric(&self) -> Metric {
        match self {
            Index::KdTree(idx) => idx.metric(),
            Index::Grid(idx) => idx.metric(),
            Index::Linear(idx) => idx.metric(),
            Index::Ensemble(idx) => idx.metric(),
        }
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [T], &'a P)> + 'a> {
        match self {
            Index::KdTree(idx) => idx.entries(),
            Index::Grid(idx) => idx.entries(),
            Index::Linear(idx) => idx.entries(),
            Index::Ensemble(idx) => idx.entries(),
        }
    }

    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>> {
        match self {
            Index::KdTree(idx) => idx.nearest(query),
            Index::Grid(idx) => idx.nearest(query),
            Index::Linear(idx) => idx.nearest(query),
            Index::Ensemble(idx) => idx.nearest(query),
        }
    }

    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>> {
        match self {
            Index::KdTree(idx) => idx.nearest_k(query, k),
            Index::Grid(idx) => idx.nearest_k(query, k),
            Index::Linear(idx) => idx.nearest_k(query, k),
            Index::Ensemble(idx) => idx.nearest_k(query, k),
        }
    }

    fn within_radius(
        &self,
        query: &[T],
        radius: f64,
        k: Option<usize>,
    ) -> Result<Vec<Neighbor<'_, T, P>>> {
        match self {
            Index::KdTree(idx) => idx.within_radius(query, radius, k),
            Index::Grid(idx) => idx.within_radius(query, radius, k),
            Index::Linear(idx) => idx.within_radius(query, radius, k),
            Index::Ensemble(idx) => idx.within_radius(query, radius, k),
        }
    }
}

/// Validate build input shape: equal-length points, 1:1 payloads, N ≥ 1.
/// Returns the shared dimensionality.
pub(crate) fn check_shape<T>(points: &[Vec<T>], payload_count: usize) -> Result<usize> {
    let first = points.first().ok_or(KnnError::EmptyInput)?;
    let dims = first.len();
    if dims == 0 {
        return Err(KnnError::DimensionMismatch {
            expected: 1,
            got: 0,
        });
    }
    for point in points {
        if point.len() != dims {
            return Err(KnnError::DimensionMismatch {
                expected: dims,
                got: point.len(),
            });
        }
    }
    if payload_count != points.len() {
        return Err(KnnError::PayloadCountMismatch {
            points: points.len(),
            payloads: payload_count,
        });
    }
    Ok(dims)
}

/// Validate a query point against the index dimensionality.
pub(crate) fn check_query<T>(dims: usize, query: &[T]) -> Result<()> {
    if query.len() != dims {
        return Err(KnnError::DimensionMismatch {
            expected: dims,
            got: query.len(),
        });
    }
    Ok(())
}

/// Rank every entry by distance to `query`, ascending. Shared by the
/// degenerate-k paths (`k == 0`, `k ≥ len`).
pub(crate) fn rank_all<'a, T, P, I>(
    metric: Metric,
    query: &[T],
    entries: I,
) -> Vec<Neighbor<'a, T, P>>
where
    T: Scalar,
    I: Iterator<Item = (&'a [T], &'a P)>,
{
    let mut all: Vec<Neighbor<'a, T, P>> = entries
        .map(|(point, payload)| Neighbor {
            point,
            payload,
            distance: metric.distance(point, query),
        })
        .collect();
    all.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
    });
    all
}
