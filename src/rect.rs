//! Axis-aligned bounding boxes in d dimensions.

use crate::scalar::Scalar;

/// An axis-aligned d-dimensional box, `min[i] ≤ max[i]` on every axis.
///
/// Each k-d search carries one of these describing the region its current
/// subtree can occupy; pruning rests entirely on
/// [`HyperRect::closest_point_to`].
#[derive(Debug, Clone, PartialEq)]
pub struct HyperRect<T> {
    min: Vec<T>,
    max: Vec<T>,
}

impl<T: Scalar> HyperRect<T> {
    pub fn new(min: Vec<T>, max: Vec<T>) -> Self {
        debug_assert_eq!(min.len(), max.len());
        debug_assert!(min.iter().zip(&max).all(|(lo, hi)| lo <= hi));
        Self { min, max }
    }

    /// A box spanning `[lo, hi]` on every one of `dims` axes. Passing the
    /// scalar's typed min/max sentinels yields the "infinite" root box.
    pub fn infinite(dims: usize, lo: T, hi: T) -> Self {
        Self {
            min: vec![lo; dims],
            max: vec![hi; dims],
        }
    }

    pub fn dims(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[T] {
        &self.min
    }

    pub fn max(&self) -> &[T] {
        &self.max
    }

    /// Split at `pivot` on `axis` into a left box (`max[axis] := pivot`)
    /// and a right box (`min[axis] := pivot`). Both halves keep the pivot
    /// plane, so points lying exactly on it belong to either side.
    pub fn split(&self, axis: usize, pivot: T) -> (Self, Self) {
        let mut left = self.clone();
        left.max[axis] = pivot;
        let mut right = self.clone();
        right.min[axis] = pivot;
        (left, right)
    }

    /// The point inside the box closest to `query`, coordinate-wise: each
    /// coordinate of `query` clamped into `[min[i], max[i]]`. A query inside
    /// the box maps to itself.
    pub fn closest_point_to(&self, query: &[T]) -> Vec<T> {
        debug_assert_eq!(query.len(), self.dims());

        let mut closest = Vec::with_capacity(query.len());
        for i in 0..query.len() {
            let c = if query[i] < self.min[i] {
                self.min[i]
            } else if query[i] > self.max[i] {
                self.max[i]
            } else {
                query[i]
            };
            closest.push(c);
        }
        closest
    }

    /// Narrow `max[axis]` to `value`, returning the displaced bound so the
    /// caller can restore it after descending. Avoids cloning a rect per
    /// tree level.
    pub(crate) fn replace_max(&mut self, axis: usize, value: T) -> T {
        std::mem::replace(&mut self.max[axis], value)
    }

    /// Narrow `min[axis]` to `value`, returning the displaced bound.
    pub(crate) fn replace_min(&mut self, axis: usize, value: T) -> T {
        std::mem::replace(&mut self.min[axis], value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_spans_sentinels() {
        let rect: HyperRect<i32> = HyperRect::infinite(3, i32::MIN, i32::MAX);
        assert_eq!(rect.dims(), 3);
        assert_eq!(rect.min(), &[i32::MIN; 3]);
        assert_eq!(rect.max(), &[i32::MAX; 3]);
    }

    #[test]
    fn split_shares_pivot_plane() {
        let rect = HyperRect::new(vec![0.0, 0.0], vec![10.0, 10.0]);
        let (left, right) = rect.split(0, 4.0);
        assert_eq!(left.max(), &[4.0, 10.0]);
        assert_eq!(left.min(), &[0.0, 0.0]);
        assert_eq!(right.min(), &[4.0, 0.0]);
        assert_eq!(right.max(), &[10.0, 10.0]);
    }

    #[test]
    fn closest_point_clamps_each_axis() {
        let rect = HyperRect::new(vec![0.0, 0.0], vec![10.0, 10.0]);
        assert_eq!(rect.closest_point_to(&[-5.0, 5.0]), vec![0.0, 5.0]);
        assert_eq!(rect.closest_point_to(&[12.0, -3.0]), vec![10.0, 0.0]);
        // Inside the box: the point itself.
        assert_eq!(rect.closest_point_to(&[3.0, 7.0]), vec![3.0, 7.0]);
    }

    #[test]
    fn replace_and_restore() {
        let mut rect = HyperRect::new(vec![0], vec![10]);
        let saved = rect.replace_max(0, 4);
        assert_eq!(rect.max(), &[4]);
        rect.replace_max(0, saved);
        assert_eq!(rect.max(), &[10]);
    }
}
