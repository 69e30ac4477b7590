use serde::{Deserialize, Serialize};

use crate::geo::Projection;
use crate::geometry::{Geom, Geometry};
use crate::impls::contour::ClosedContour;

/// Polygon with an outer ring and optional holes.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct Polygon<P> {
    /// Outer contour.
    pub outer_contour: ClosedContour<P>,
    /// Inner contours.
    pub inner_contours: Vec<ClosedContour<P>>,
}

impl<P> Polygon<P> {
    /// Creates a new polygon.
    pub fn new(outer_contour: ClosedContour<P>, inner_contours: Vec<ClosedContour<P>>) -> Self {
        Self {
            outer_contour,
            inner_contours,
        }
    }

    /// Iterates over all rings of the polygon, outer one first.
    pub fn iter_contours(&self) -> impl Iterator<Item = &ClosedContour<P>> {
        std::iter::once(&self.outer_contour).chain(self.inner_contours.iter())
    }

    /// Projects every ring of the polygon.
    pub fn project_points<Out, Proj>(&self, projection: &Proj) -> Option<Polygon<Out>>
    where
        Proj: Projection<InPoint = P, OutPoint = Out> + ?Sized,
    {
        Some(Polygon {
            outer_contour: self.outer_contour.project_points(projection)?,
            inner_contours: self
                .inner_contours
                .iter()
                .map(|c| c.project_points(projection))
                .collect::<Option<Vec<_>>>()?,
        })
    }
}

impl<P> From<ClosedContour<P>> for Polygon<P> {
    fn from(value: ClosedContour<P>) -> Self {
        Self {
            outer_contour: value,
            inner_contours: vec![],
        }
    }
}

impl<P> From<Vec<P>> for Polygon<P> {
    fn from(value: Vec<P>) -> Self {
        Self {
            outer_contour: ClosedContour::new(value),
            inner_contours: vec![],
        }
    }
}

impl<P> Geometry for Polygon<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        Some(Geom::Polygon(self.project_points(projection)?))
    }

    fn vertex_count(&self) -> usize {
        self.iter_contours().map(|c| c.points.len()).sum()
    }
}
