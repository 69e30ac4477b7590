use serde::{Deserialize, Serialize};

use crate::geo::Projection;
use crate::geometry::{Geom, Geometry};
use crate::impls::polygon::Polygon;

/// A set of polygons.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize)]
pub struct MultiPolygon<P> {
    /// Inner polygons.
    pub parts: Vec<Polygon<P>>,
}

impl<P> From<Vec<Polygon<P>>> for MultiPolygon<P> {
    fn from(parts: Vec<Polygon<P>>) -> Self {
        Self { parts }
    }
}

impl<P> MultiPolygon<P> {
    /// Returns reference to the inner polygons.
    pub fn parts(&self) -> &[Polygon<P>] {
        &self.parts
    }
}

impl<P> Geometry for MultiPolygon<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        let parts = self
            .parts
            .iter()
            .map(|p| p.project_points(projection))
            .collect::<Option<Vec<_>>>()?;
        Some(Geom::MultiPolygon(parts.into()))
    }

    fn vertex_count(&self) -> usize {
        self.parts.iter().map(|p| p.vertex_count()).sum()
    }
}
