use nalgebra::Scalar;
pub use nalgebra::Point2;
use num_traits::{Bounded, FromPrimitive, Num};

/// 2d point with `f64` coordinates.
pub type Point2d = Point2<f64>;

/// Point in a 2d cartesian coordinate space.
///
/// Source layers provide their coordinates through this trait: `x` is easting (or longitude for geographic
/// systems) and `y` is northing (or latitude).
pub trait CartesianPoint2d {
    /// Numeric type of the coordinates.
    type Num: Num + Copy + PartialOrd + Bounded + Scalar + FromPrimitive;

    /// X coordinate.
    fn x(&self) -> Self::Num;
    /// Y coordinate.
    fn y(&self) -> Self::Num;

    /// Returns true if both coordinates of the points are equal.
    fn equal(&self, other: &impl CartesianPoint2d<Num = Self::Num>) -> bool {
        self.x() == other.x() && self.y() == other.y()
    }
}

/// Point type that can be constructed from its coordinates.
pub trait NewCartesianPoint2d<Num = f64>: CartesianPoint2d<Num = Num> {
    /// Creates a new point.
    fn new(x: Num, y: Num) -> Self;
}

impl<N: Num + Copy + PartialOrd + Bounded + Scalar + FromPrimitive> CartesianPoint2d for Point2<N> {
    type Num = N;

    fn x(&self) -> N {
        self.x
    }

    fn y(&self) -> N {
        self.y
    }
}

impl<N: Num + Copy + PartialOrd + Bounded + Scalar + FromPrimitive> NewCartesianPoint2d<N>
    for Point2<N>
{
    fn new(x: N, y: N) -> Self {
        Point2::new(x, y)
    }
}
