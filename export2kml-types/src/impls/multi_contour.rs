use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::geo::Projection;
use crate::geometry::{Geom, Geometry};
use crate::impls::contour::Contour;

/// A set of contours.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct MultiContour<P>(Vec<Contour<P>>);

impl<P> From<Vec<Contour<P>>> for MultiContour<P> {
    fn from(value: Vec<Contour<P>>) -> Self {
        Self(value)
    }
}

impl<P> Deref for MultiContour<P> {
    type Target = [Contour<P>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P> Geometry for MultiContour<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        let contours = self
            .0
            .iter()
            .map(|c| c.project_points(projection))
            .collect::<Option<Vec<_>>>()?;
        Some(Geom::MultiContour(contours.into()))
    }

    fn vertex_count(&self) -> usize {
        self.0.iter().map(|c| c.len()).sum()
    }
}
