//! Coordinate scalar abstraction.
//!
//! Points are sequences of any scalar implementing [`Scalar`]: the built-in
//! floats and signed integers all qualify through the blanket impl. Distance
//! arithmetic is always carried out in `f64` (each coordinate is converted
//! once), so integer coordinates never overflow against sentinel-wide
//! hyper-rect corners. Integer coordinates beyond 2^53 lose precision in
//! distance values; `NaN` coordinates are not supported.

use std::fmt::Debug;

use num_traits::{Bounded, ToPrimitive};

/// A number type usable as a point coordinate.
///
/// `Bounded` supplies the typed min/max sentinels used to span the infinite
/// hyper-rect at the root of a k-d search, and `ToPrimitive` supplies the
/// `f64` view used for all distance arithmetic and grid geometry.
pub trait Scalar:
    Copy + PartialOrd + Debug + Send + Sync + Bounded + ToPrimitive + 'static
{
    /// View this coordinate as an `f64`.
    #[inline]
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

/// Blanket [`Scalar`] implementation.
impl<T> Scalar for T where
    T: Copy + PartialOrd + Debug + Send + Sync + Bounded + ToPrimitive + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinels<T: Scalar>() -> (T, T) {
        (T::min_value(), T::max_value())
    }

    #[test]
    fn sentinel_bounds() {
        assert_eq!(sentinels::<i32>(), (i32::MIN, i32::MAX));
        assert_eq!(sentinels::<f64>(), (f64::MIN, f64::MAX));
    }

    #[test]
    fn f64_view() {
        assert_eq!(3i64.as_f64(), 3.0);
        assert_eq!((-2.5f32).as_f64(), -2.5);
    }
}
