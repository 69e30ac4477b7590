use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::geo::Projection;
use crate::geometry::{Geom, Geometry};

/// A set of points.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct MultiPoint<P>(Vec<P>);

impl<P> From<Vec<P>> for MultiPoint<P> {
    fn from(value: Vec<P>) -> Self {
        Self(value)
    }
}

impl<P> Deref for MultiPoint<P> {
    type Target = [P];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P> Geometry for MultiPoint<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        let points = self
            .0
            .iter()
            .map(|p| projection.project(p))
            .collect::<Option<Vec<_>>>()?;
        Some(Geom::MultiPoint(points.into()))
    }

    fn vertex_count(&self) -> usize {
        self.0.len()
    }
}
