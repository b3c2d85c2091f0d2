//! Distance metrics over coordinate vectors.
//!
//! Four named metrics with precise return conventions:
//!
//! - [`manhattan_distance`]: `Σ |xᵢ − yᵢ|`
//! - [`squared_euclidean_distance`]: `Σ (xᵢ − yᵢ)²` — *squared*, never
//!   rooted; caller radii are squared once by [`Metric::effective_radius`]
//! - [`chebyshev_distance`]: `max |xᵢ − yᵢ|`
//! - [`cosine_distance`]: `1 − (x·y)/(‖x‖‖y‖)` with one square root of the
//!   magnitude product

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// Which distance function an index uses.
///
/// The tag drives two policy decisions beyond the distance itself: whether
/// caller radii are squared before searching (Euclidean only), and which
/// shell enumerator the grid index walks (cosine has none and is rejected
/// by the grid backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L1 / taxicab distance.
    Manhattan,
    /// Squared L2 distance.
    Euclidean,
    /// L∞ / maximum-coordinate distance.
    Chebyshev,
    /// `1 − cos(x, y)`; not a true metric, usable with the k-d tree and
    /// linear backends only.
    Cosine,
}

impl Metric {
    /// Distance between two points under this metric.
    #[inline]
    pub fn distance<T: Scalar>(self, a: &[T], b: &[T]) -> f64 {
        match self {
            Metric::Manhattan => manhattan_distance(a, b),
            Metric::Euclidean => squared_euclidean_distance(a, b),
            Metric::Chebyshev => chebyshev_distance(a, b),
            Metric::Cosine => cosine_distance(a, b),
        }
    }

    /// Convert a caller-supplied radius into the scale [`Metric::distance`]
    /// reports: squared for Euclidean, unchanged otherwise.
    #[inline]
    pub fn effective_radius(self, radius: f64) -> f64 {
        match self {
            Metric::Euclidean => radius * radius,
            _ => radius,
        }
    }

    /// Inverse of [`Metric::effective_radius`]: map a reported distance back
    /// to the caller's radius scale.
    #[inline]
    pub(crate) fn unsquared(self, distance: f64) -> f64 {
        match self {
            Metric::Euclidean => distance.sqrt(),
            _ => distance,
        }
    }

    /// Whether the grid index has a shell enumerator for this metric.
    #[inline]
    pub fn grid_compatible(self) -> bool {
        !matches!(self, Metric::Cosine)
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Euclidean
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Manhattan => write!(f, "manhattan"),
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::Chebyshev => write!(f, "chebyshev"),
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Compute the L1 (taxicab) distance between two points.
#[inline]
pub fn manhattan_distance<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = 0.0;
    for i in 0..a.len() {
        sum += (a[i].as_f64() - b[i].as_f64()).abs();
    }
    sum
}

/// Compute the squared L2 distance between two points.
///
/// The square root is never taken; relative ordering is identical and the
/// root is left to callers that want a true Euclidean length.
#[inline]
pub fn squared_euclidean_distance<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = 0.0;
    for i in 0..a.len() {
        let diff = a[i].as_f64() - b[i].as_f64();
        sum += diff * diff;
    }
    sum
}

/// Compute the L∞ (Chebyshev) distance between two points.
#[inline]
pub fn chebyshev_distance<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut max = 0.0f64;
    for i in 0..a.len() {
        let diff = (a[i].as_f64() - b[i].as_f64()).abs();
        if diff > max {
            max = diff;
        }
    }
    max
}

/// Compute the cosine distance `1 − cos(x, y)` between two points.
///
/// Returns 2 (the opposite-direction value, `1 − (−1)`) when either vector
/// has zero magnitude, and 1 (orthogonal) when the dot product is zero. The
/// zero-magnitude case is checked first: a zero vector also has a zero dot
/// product, so the opposite order would make the value 2 unreachable.
#[inline]
pub fn cosine_distance<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0;
    let mut aa = 0.0;
    let mut bb = 0.0;
    for i in 0..a.len() {
        let x = a[i].as_f64();
        let y = b[i].as_f64();
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }

    if aa == 0.0 || bb == 0.0 {
        return 2.0;
    }
    if dot == 0.0 {
        return 1.0;
    }
    1.0 - dot / (aa * bb).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan() {
        assert_eq!(manhattan_distance(&[0.0, 0.0], &[3.0, -4.0]), 7.0);
        assert_eq!(manhattan_distance(&[1, 2, 3], &[4, 6, 3]), 7.0);
    }

    #[test]
    fn squared_euclidean_is_not_rooted() {
        assert_eq!(squared_euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_euclidean_distance(&[0, 0], &[5, 12]), 169.0);
    }

    #[test]
    fn chebyshev() {
        assert_eq!(chebyshev_distance(&[-3, 4], &[4, -3]), 7.0);
        assert_eq!(chebyshev_distance(&[1.0, 1.0, 1.0], &[2.0, 0.5, 1.0]), 1.0);
    }

    #[test]
    fn cosine_identical_direction() {
        let d = cosine_distance(&[1.0, 0.0], &[2.0, 0.0]);
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn cosine_orthogonal() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0);
    }

    #[test]
    fn cosine_opposite() {
        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_zero_magnitude() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 0.0]), 2.0);
        assert_eq!(cosine_distance::<f64>(&[0.0, 0.0], &[0.0, 0.0]), 2.0);
    }

    #[test]
    fn radius_policy() {
        assert_eq!(Metric::Euclidean.effective_radius(3.0), 9.0);
        assert_eq!(Metric::Manhattan.effective_radius(3.0), 3.0);
        assert_eq!(Metric::Chebyshev.effective_radius(3.0), 3.0);
        assert_eq!(Metric::Euclidean.unsquared(9.0), 3.0);
        assert_eq!(Metric::Chebyshev.unsquared(9.0), 9.0);
    }

    #[test]
    fn grid_compatibility() {
        assert!(Metric::Manhattan.grid_compatible());
        assert!(Metric::Euclidean.grid_compatible());
        assert!(Metric::Chebyshev.grid_compatible());
        assert!(!Metric::Cosine.grid_compatible());
    }
}
