//! Exhaustive-scan baseline index.

use crate::bounded::BoundedPriorityList;
use crate::metric::Metric;
use crate::scalar::Scalar;
use crate::{KnnError, Neighbor, Result};

use super::{check_query, check_shape, rank_all, IndexOptions, SpatialIndex};

/// Brute-force scan over every stored point.
///
/// O(N) per query with no build cost beyond taking ownership of the data.
/// It runs every candidate through the same bounded priority list the other
/// backends use, which makes it the correctness oracle for their tests.
#[derive(Debug)]
pub struct LinearIndex<T, P> {
    dims: usize,
    metric: Metric,
    points: Vec<Box<[T]>>,
    payloads: Vec<P>,
}

impl<T: Scalar, P> LinearIndex<T, P> {
    pub fn build(
        points: Vec<Vec<T>>,
        payloads: Vec<P>,
        options: IndexOptions<T>,
    ) -> Result<Self> {
        let dims = check_shape(&points, payloads.len())?;
        Ok(Self {
            dims,
            metric: options.metric,
            points: points.into_iter().map(Vec::into_boxed_slice).collect(),
            payloads,
        })
    }

    fn collect(&self, query: &[T], capacity: usize, limit: f64) -> BoundedPriorityList<usize> {
        let mut list = BoundedPriorityList::new(capacity);
        for (i, point) in self.points.iter().enumerate() {
            let distance = self.metric.distance(point, query);
            if distance <= limit {
                list.add(i, distance);
            }
        }
        list
    }

    fn materialize(&self, list: &BoundedPriorityList<usize>) -> Vec<Neighbor<'_, T, P>> {
        list.iter()
            .map(|(i, distance)| Neighbor {
                point: &self.points[i],
                payload: &self.payloads[i],
                distance,
            })
            .collect()
    }
}

impl<T: Scalar, P: Sync> LinearIndex<T, P> {
    /// Answer many k-NN queries in parallel, one result per query in input
    /// order. Each individual query stays sequential, so results are
    /// identical to [`SpatialIndex::nearest_k`] call by call.
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

impl<T: Scalar, P> SpatialIndex<T, P> for LinearIndex<T, P> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [T], &'a P)> + 'a> {
        Box::new(
            self.points
                .iter()
                .map(|p| &p[..])
                .zip(self.payloads.iter()),
        )
    }

    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>> {
        let mut best = self.nearest_k(query, 1)?;
        best.pop().ok_or(KnnError::EmptyInput)
    }

    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        if k == 0 || k >= self.points.len() {
            return Ok(rank_all(self.metric, query, self.entries()));
        }
        let list = self.collect(query, k, f64::INFINITY);
        Ok(self.materialize(&list))
    }

    fn within_radius(
        &self,
        query: &[T],
        radius: f64,
        k: Option<usize>,
    ) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        if radius < 0.0 {
            return Ok(Vec::new());
        }
        let capacity = match k {
            Some(k) if k > 0 && k < self.points.len() => k,
            _ => self.points.len(),
        };
        let list = self.collect(query, capacity, self.metric.effective_radius(radius));
        Ok(self.materialize(&list))
    }
}
