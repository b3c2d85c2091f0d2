//! Balanced k-d tree over a static point set.

use tracing::debug;

use crate::bounded::BoundedPriorityList;
use crate::metric::Metric;
use crate::rect::HyperRect;
use crate::scalar::Scalar;
use crate::select::nth_smallest;
use crate::{Neighbor, Result};

use super::{check_query, check_shape, rank_all, IndexOptions, SpatialIndex};

/// A balanced k-d tree stored level-order in two parallel arrays.
///
/// Slot `i`'s children live at `2i + 1` and `2i + 2`; empty slots hold
/// `None`. The arrays are sized `2^⌈log₂(N+1)⌉` at build and never resized.
/// Queries descend with a hyper-rect bounding the region a subtree can
/// occupy and prune any subtree whose rect cannot beat the current
/// candidate list.
#[derive(Debug)]
pub struct KdTree<T, P> {
    dims: usize,
    len: usize,
    metric: Metric,
    bounds_lo: T,
    bounds_hi: T,
    points: Vec<Option<Box<[T]>>>,
    payloads: Vec<Option<P>>,
}

impl<T: Scalar, P> KdTree<T, P> {
    /// Build a balanced tree by recursive median split. O(N log N).
    pub fn build(
        points: Vec<Vec<T>>,
        payloads: Vec<P>,
        options: IndexOptions<T>,
    ) -> Result<Self> {
        let dims = check_shape(&points, payloads.len())?;
        let len = points.len();

        // Smallest complete level-order layout that can hold N nodes.
        let slots = (len + 1).next_power_of_two();
        let mut tree = Self {
            dims,
            len,
            metric: options.metric,
            bounds_lo: options.sentinel_lo(),
            bounds_hi: options.sentinel_hi(),
            points: (0..slots).map(|_| None).collect(),
            payloads: (0..slots).map(|_| None).collect(),
        };

        let items: Vec<(Box<[T]>, P)> = points
            .into_iter()
            .map(Vec::into_boxed_slice)
            .zip(payloads)
            .collect();
        tree.build_subtree(0, 0, items);

        debug!(n = len, dims, slots, metric = %tree.metric, "built kd-tree");
        Ok(tree)
    }

    fn store(&mut self, slot: usize, point: Box<[T]>, payload: P) {
        self.points[slot] = Some(point);
        self.payloads[slot] = Some(payload);
    }

    fn build_subtree(&mut self, slot: usize, axis: usize, mut items: Vec<(Box<[T]>, P)>) {
        let count = items.len();
        if count == 0 {
            return;
        }
        if count == 1 {
            let (point, payload) = items.pop().expect("checked non-empty");
            self.store(slot, point, payload);
            return;
        }

        let m = count / 2;
        let mut projections: Vec<T> = items.iter().map(|(p, _)| p[axis]).collect();
        let pivot = nth_smallest(&mut projections, m);

        // Position-exact split around the pivot value. Strictly smaller
        // items always go left and strictly greater always right; items
        // equal to the pivot top the left batch up to exactly m entries and
        // spill right afterwards. Equal coordinates sit on the closed
        // boundary both child rects share, so either side is consistent
        // with the pruning invariant, and both subtrees stay within their
        // level-order regions.
        let smaller = projections.iter().filter(|&&v| v < pivot).count();
        let mut equal_left = m - smaller;

        let mut median: Option<(Box<[T]>, P)> = None;
        let mut left = Vec::with_capacity(m);
        let mut right = Vec::with_capacity(count - m - 1);
        for item in items {
            let c = item.0[axis];
            if c < pivot {
                left.push(item);
            } else if c > pivot {
                right.push(item);
            } else if median.is_none() {
                median = Some(item);
            } else if equal_left > 0 {
                equal_left -= 1;
                left.push(item);
            } else {
                right.push(item);
            }
        }

        let (point, payload) = median.expect("pivot matches at least one item");
        self.store(slot, point, payload);

        let next = (axis + 1) % self.dims;
        self.build_subtree(2 * slot + 1, next, left);
        self.build_subtree(2 * slot + 2, next, right);
    }

    fn point_at(&self, slot: usize) -> Option<&[T]> {
        self.points.get(slot)?.as_deref()
    }

    /// Lower bound on the distance from `query` to anything inside `rect`.
    ///
    /// Cosine admits no coordinate-clamp lower bound, so it degrades to 0
    /// (never prunes) and the traversal visits every node.
    fn rect_bound(&self, rect: &HyperRect<T>, query: &[T]) -> f64 {
        match self.metric {
            Metric::Cosine => 0.0,
            metric => metric.distance(&rect.closest_point_to(query), query),
        }
    }

    /// Branch-and-bound traversal. `limit` is in the metric's reported
    /// scale (already squared for Euclidean).
    fn search_node(
        &self,
        slot: usize,
        axis: usize,
        rect: &mut HyperRect<T>,
        query: &[T],
        limit: f64,
        list: &mut BoundedPriorityList<usize>,
    ) {
        let Some(point) = self.point_at(slot) else {
            return;
        };
        let pivot = point[axis];
        let next = (axis + 1) % self.dims;

        let left = 2 * slot + 1;
        let right = 2 * slot + 2;
        let (near, far) = if query[axis] <= pivot {
            (left, right)
        } else {
            (right, left)
        };

        // Descend the near side first, narrowing the rect toward the query.
        if near == left {
            let saved = rect.replace_max(axis, pivot);
            self.search_node(near, next, rect, query, limit, list);
            rect.replace_max(axis, saved);
        } else {
            let saved = rect.replace_min(axis, pivot);
            self.search_node(near, next, rect, query, limit, list);
            rect.replace_min(axis, saved);
        }

        // The far side is only worth visiting if its region could still
        // hold something within the limit and better than the current
        // worst candidate.
        if far == left {
            let saved = rect.replace_max(axis, pivot);
            let bound = self.rect_bound(rect, query);
            if bound <= limit && (!list.is_full() || list.max_priority().map_or(true, |w| bound < w))
            {
                self.search_node(far, next, rect, query, limit, list);
            }
            rect.replace_max(axis, saved);
        } else {
            let saved = rect.replace_min(axis, pivot);
            let bound = self.rect_bound(rect, query);
            if bound <= limit && (!list.is_full() || list.max_priority().map_or(true, |w| bound < w))
            {
                self.search_node(far, next, rect, query, limit, list);
            }
            rect.replace_min(axis, saved);
        }

        let distance = self.metric.distance(point, query);
        if distance <= limit {
            list.add(slot, distance);
        }
    }

    fn collect(&self, query: &[T], capacity: usize, limit: f64) -> BoundedPriorityList<usize> {
        let mut list = BoundedPriorityList::new(capacity);
        let mut rect = HyperRect::infinite(self.dims, self.bounds_lo, self.bounds_hi);
        self.search_node(0, 0, &mut rect, query, limit, &mut list);
        list
    }

    fn materialize(&self, list: &BoundedPriorityList<usize>) -> Vec<Neighbor<'_, T, P>> {
        list.iter()
            .filter_map(|(slot, distance)| {
                match (&self.points[slot], &self.payloads[slot]) {
                    (Some(point), Some(payload)) => Some(Neighbor {
                        point,
                        payload,
                        distance,
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

impl<T: Scalar, P> SpatialIndex<T, P> for KdTree<T, P> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.len
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [T], &'a P)> + 'a> {
        Box::new(
            self.points
                .iter()
                .zip(&self.payloads)
                .filter_map(|(point, payload)| match (point, payload) {
                    (Some(point), Some(payload)) => Some((&point[..], payload)),
                    _ => None,
                }),
        )
    }

    fn nearest(&self, query: &[T]) -> Result<Neighbor<'_, T, P>> {
        let mut best = self.nearest_k(query, 1)?;
        // Build rejects empty input, so one entry always exists.
        best.pop().ok_or(crate::KnnError::EmptyInput)
    }

    fn nearest_k(&self, query: &[T], k: usize) -> Result<Vec<Neighbor<'_, T, P>>> {
        check_query(self.dims, query)?;
        if k == 0 || k >= self.len {
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
            Some(k) if k > 0 && k < self.len => k,
            _ => self.len,
        };
        let list = self.collect(query, capacity, self.metric.effective_radius(radius));
        Ok(self.materialize(&list))
    }
}
