use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::geo::Projection;
use crate::geometry::{Geom, Geometry};

/// Sequence of points connected with straight segments. An open contour is a line string, a closed one is a ring.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct Contour<Point> {
    points: Vec<Point>,
    is_closed: bool,
}

impl<Point> Deref for Contour<Point> {
    type Target = Vec<Point>;

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl<Point> Contour<Point> {
    /// Creates a new contour.
    pub fn new(points: Vec<Point>, is_closed: bool) -> Self {
        Self { points, is_closed }
    }

    /// Creates a new open contour.
    pub fn open(points: Vec<Point>) -> Self {
        Self {
            points,
            is_closed: false,
        }
    }

    /// Creates a new closed contour.
    pub fn closed(points: Vec<Point>) -> Self {
        Self {
            points,
            is_closed: true,
        }
    }

    /// Whether the last point connects back to the first one.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// Converts self into a `ClosedContour` instance if the contour is closed, or returns `None` if the contour is
    /// open.
    pub fn into_closed(self) -> Option<ClosedContour<Point>> {
        if self.is_closed {
            Some(ClosedContour {
                points: self.points,
            })
        } else {
            None
        }
    }

    /// Projects all the points of the contour with the given projection.
    pub fn project_points<P, Proj>(&self, projection: &Proj) -> Option<Contour<P>>
    where
        Proj: Projection<InPoint = Point, OutPoint = P> + ?Sized,
    {
        let points = self
            .points
            .iter()
            .map(|p| projection.project(p))
            .collect::<Option<Vec<P>>>()?;
        Some(Contour {
            points,
            is_closed: self.is_closed,
        })
    }
}

/// Ring of points. The closing segment from the last point back to the first one is implied; the first point may
/// or may not be repeated at the end, the contour keeps whatever it was given.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct ClosedContour<Point> {
    /// Points of the contour.
    pub points: Vec<Point>,
}

impl<Point> ClosedContour<Point> {
    /// Creates a new closed contour.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Projects all the points of the contour with the given projection. Order of the points (and so the winding
    /// of the ring) is kept.
    pub fn project_points<P, Proj>(&self, projection: &Proj) -> Option<ClosedContour<P>>
    where
        Proj: Projection<InPoint = Point, OutPoint = P> + ?Sized,
    {
        let points = self
            .points
            .iter()
            .map(|p| projection.project(p))
            .collect::<Option<Vec<P>>>()?;
        Some(ClosedContour { points })
    }
}

impl<P> From<ClosedContour<P>> for Contour<P> {
    fn from(value: ClosedContour<P>) -> Self {
        Self {
            points: value.points,
            is_closed: true,
        }
    }
}

impl<P> Geometry for Contour<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        Some(Geom::Contour(self.project_points(projection)?))
    }

    fn vertex_count(&self) -> usize {
        self.points.len()
    }
}

impl<P> Geometry for ClosedContour<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        Some(Geom::Contour(self.project_points(projection)?.into()))
    }

    fn vertex_count(&self) -> usize {
        self.points.len()
    }
}
