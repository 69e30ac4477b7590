use crate::cartesian::{CartesianPoint2d, Point2};
use nalgebra::Scalar;
use num_traits::{FromPrimitive, Num};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect<N = f64> {
    /// Minimum x value.
    pub x_min: N,
    /// Minimum y value.
    pub y_min: N,
    /// Maximum x value.
    pub x_max: N,
    /// Maximum y value.
    pub y_max: N,
}

impl<N: Num + Copy + PartialOrd + Scalar + FromPrimitive> Rect<N> {
    /// Creates a new rectangle.
    pub fn new(x_min: N, y_min: N, x_max: N, y_max: N) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Minimum x value.
    pub fn x_min(&self) -> N {
        self.x_min
    }

    /// Maximum x value.
    pub fn x_max(&self) -> N {
        self.x_max
    }

    /// Minimum y value.
    pub fn y_min(&self) -> N {
        self.y_min
    }

    /// Maximum y value.
    pub fn y_max(&self) -> N {
        self.y_max
    }

    /// Width of the rectangle.
    pub fn width(&self) -> N {
        self.x_max - self.x_min
    }

    /// Height of the rectangle.
    pub fn height(&self) -> N {
        self.y_max - self.y_min
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: if self.x_min < other.x_min {
                self.x_min
            } else {
                other.x_min
            },
            y_min: if self.y_min < other.y_min {
                self.y_min
            } else {
                other.y_min
            },
            x_max: if self.x_max > other.x_max {
                self.x_max
            } else {
                other.x_max
            },
            y_max: if self.y_max > other.y_max {
                self.y_max
            } else {
                other.y_max
            },
        }
    }

    /// Degenerate rectangle around a single point.
    pub fn from_point(p: &impl CartesianPoint2d<Num = N>) -> Self {
        Self {
            x_min: p.x(),
            x_max: p.x(),
            y_min: p.y(),
            y_max: p.y(),
        }
    }

    /// Bounding rectangle of the points. Returns `None` if the iterator is empty.
    pub fn from_points<'a, P: CartesianPoint2d<Num = N> + 'a>(
        mut points: impl Iterator<Item = &'a P>,
    ) -> Option<Self> {
        let first = points.next()?;
        let mut rect = Self::from_point(first);

        for p in points {
            if rect.x_min > p.x() {
                rect.x_min = p.x();
            }
            if rect.y_min > p.y() {
                rect.y_min = p.y();
            }
            if rect.x_max < p.x() {
                rect.x_max = p.x();
            }
            if rect.y_max < p.y() {
                rect.y_max = p.y();
            }
        }

        Some(rect)
    }

    /// Returns true if the point is inside the rectangle or on its border.
    pub fn contains(&self, point: &impl CartesianPoint2d<Num = N>) -> bool {
        self.x_min <= point.x()
            && self.x_max >= point.x()
            && self.y_min <= point.y()
            && self.y_max >= point.y()
    }

    /// Returns true if `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Self) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && self.x_max >= other.x_max
            && self.y_max >= other.y_max
    }

    /// Corners of the rectangle, counter-clockwise starting from the minimum corner.
    pub fn into_quadrangle(self) -> [Point2<N>; 4] {
        [
            Point2::new(self.x_min, self.y_min),
            Point2::new(self.x_max, self.y_min),
            Point2::new(self.x_max, self.y_max),
            Point2::new(self.x_min, self.y_max),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartesian::Point2d;

    #[test]
    fn from_points() {
        let points = [
            Point2d::new(1.0, 5.0),
            Point2d::new(-2.0, 3.0),
            Point2d::new(4.0, -1.0),
        ];
        let rect = Rect::from_points(points.iter()).unwrap();
        assert_eq!(rect, Rect::new(-2.0, -1.0, 4.0, 5.0));
        assert!(Rect::<f64>::from_points(std::iter::empty::<&Point2d>()).is_none());
    }

    #[test]
    fn merge_and_contains() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(0.5, -1.0, 2.0, 0.5);
        let merged = a.merge(b);
        assert_eq!(merged, Rect::new(0.0, -1.0, 2.0, 1.0));
        assert!(merged.contains_rect(&a));
        assert!(merged.contains_rect(&b));
        assert!(!a.contains_rect(&merged));
        assert!(a.contains(&Point2d::new(1.0, 1.0)));
        assert!(!a.contains(&Point2d::new(1.0, 1.1)));
    }
}
