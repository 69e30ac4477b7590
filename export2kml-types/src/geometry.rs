use crate::cartesian::{CartesianPoint2d, Point2, Rect};
use crate::geo::{GeoPoint2d, Projection};
use crate::impls::{Contour, MultiContour, MultiPoint, MultiPolygon, Polygon};
use nalgebra::Scalar;
use serde::{Deserialize, Serialize};

/// Geometry of any of the supported types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geom<P> {
    /// Point geometry.
    Point(P),
    /// MultiPoint geometry.
    MultiPoint(MultiPoint<P>),
    /// Contour (line string or ring) geometry.
    Contour(Contour<P>),
    /// MultiContour geometry.
    MultiContour(MultiContour<P>),
    /// Polygon geometry.
    Polygon(Polygon<P>),
    /// MultiPolygon geometry.
    MultiPolygon(MultiPolygon<P>),
}

/// Geometry that can be converted into another coordinate space.
pub trait Geometry {
    /// Type of the points the geometry consists of.
    type Point;

    /// Projects the geometry with the given projection. Returns `None` if any of the points cannot be projected.
    ///
    /// Every point is projected on its own, so the result has the same number of vertices in the same order as
    /// the source.
    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized;

    /// Total number of vertices in the geometry.
    fn vertex_count(&self) -> usize;

    /// Returns true if the geometry has no vertices at all.
    fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }
}

impl<P> Geometry for Geom<P> {
    type Point = P;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = P> + ?Sized,
    {
        match &self {
            Geom::Point(v) => Some(Geom::Point(projection.project(v)?)),
            Geom::MultiPoint(v) => v.project(projection),
            Geom::Contour(v) => v.project(projection),
            Geom::MultiContour(v) => v.project(projection),
            Geom::Polygon(v) => v.project(projection),
            Geom::MultiPolygon(v) => v.project(projection),
        }
    }

    fn vertex_count(&self) -> usize {
        match self {
            Geom::Point(_) => 1,
            Geom::MultiPoint(v) => v.vertex_count(),
            Geom::Contour(v) => v.vertex_count(),
            Geom::MultiContour(v) => v.vertex_count(),
            Geom::Polygon(v) => v.vertex_count(),
            Geom::MultiPolygon(v) => v.vertex_count(),
        }
    }
}

impl<P> Geom<P> {
    /// Name of the geometry type, as used in log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geom::Point(_) => "Point",
            Geom::MultiPoint(_) => "MultiPoint",
            Geom::Contour(c) if c.is_closed() => "LinearRing",
            Geom::Contour(_) => "LineString",
            Geom::MultiContour(_) => "MultiLineString",
            Geom::Polygon(_) => "Polygon",
            Geom::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Calls `f` for every vertex of the geometry.
    pub fn for_each_point(&self, mut f: impl FnMut(&P)) {
        match self {
            Geom::Point(p) => f(p),
            Geom::MultiPoint(points) => points.iter().for_each(f),
            Geom::Contour(contour) => contour.iter().for_each(f),
            Geom::MultiContour(contours) => contours.iter().flat_map(|c| c.iter()).for_each(f),
            Geom::Polygon(polygon) => polygon
                .iter_contours()
                .flat_map(|c| c.points.iter())
                .for_each(f),
            Geom::MultiPolygon(polygons) => polygons
                .parts()
                .iter()
                .flat_map(|p| p.iter_contours())
                .flat_map(|c| c.points.iter())
                .for_each(f),
        }
    }
}

impl<P: CartesianPoint2d> Geom<P> {
    /// Bounding rectangle of the geometry, or `None` if it has no vertices.
    pub fn bounding_rectangle(&self) -> Option<Rect<P::Num>> {
        let mut rect: Option<Rect<P::Num>> = None;
        self.for_each_point(|p| {
            let point_rect = Rect::from_point(p);
            rect = Some(match rect {
                Some(r) => r.merge(point_rect),
                None => point_rect,
            });
        });
        rect
    }
}

impl<N: Scalar> Geometry for Point2<N> {
    type Point = Point2<N>;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        Some(Geom::Point(projection.project(self)?))
    }

    fn vertex_count(&self) -> usize {
        1
    }
}

impl Geometry for GeoPoint2d {
    type Point = Self;

    fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = Self::Point> + ?Sized,
    {
        Some(Geom::Point(projection.project(self)?))
    }

    fn vertex_count(&self) -> usize {
        1
    }
}

impl<P> From<P> for Geom<P> {
    fn from(value: P) -> Self {
        Self::Point(value)
    }
}

impl<P> From<Contour<P>> for Geom<P> {
    fn from(value: Contour<P>) -> Self {
        Self::Contour(value)
    }
}

impl<P> From<Polygon<P>> for Geom<P> {
    fn from(value: Polygon<P>) -> Self {
        Self::Polygon(value)
    }
}

impl<P> From<MultiPoint<P>> for Geom<P> {
    fn from(value: MultiPoint<P>) -> Self {
        Self::MultiPoint(value)
    }
}

impl<P> From<MultiContour<P>> for Geom<P> {
    fn from(value: MultiContour<P>) -> Self {
        Self::MultiContour(value)
    }
}

impl<P> From<MultiPolygon<P>> for Geom<P> {
    fn from(value: MultiPolygon<P>) -> Self {
        Self::MultiPolygon(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartesian::Point2d;
    use crate::geo::{GeoPoint, InvertedProjection};
    use crate::geo::Crs;
    use crate::impls::ClosedContour;

    fn square_with_hole() -> Polygon<Point2d> {
        Polygon::new(
            ClosedContour::new(vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 0.0),
                Point2d::new(10.0, 10.0),
                Point2d::new(0.0, 10.0),
                Point2d::new(0.0, 0.0),
            ]),
            vec![ClosedContour::new(vec![
                Point2d::new(2.0, 2.0),
                Point2d::new(2.0, 4.0),
                Point2d::new(4.0, 4.0),
            ])],
        )
    }

    #[test]
    fn projection_keeps_vertex_order() {
        let polygon = square_with_hole();
        let projection = InvertedProjection::new(
            Crs::WGS84
                .get_projection::<GeoPoint2d, Point2d>()
                .unwrap(),
        );
        let Some(Geom::Polygon(projected)) = polygon.project(&projection) else {
            panic!("polygon expected");
        };

        assert_eq!(projected.vertex_count(), polygon.vertex_count());
        for (source, target) in polygon
            .outer_contour
            .points
            .iter()
            .zip(projected.outer_contour.points.iter())
        {
            assert_eq!(source.x, target.lon());
            assert_eq!(source.y, target.lat());
        }
        assert_eq!(projected.inner_contours[0].points[1].lat(), 4.0);
    }

    #[test]
    fn failed_point_fails_geometry() {
        let line: Geom<Point2d> =
            Contour::open(vec![Point2d::new(0.0, 0.0), Point2d::new(0.0, 120.0)]).into();
        let projection = InvertedProjection::new(
            Crs::WGS84
                .get_projection::<GeoPoint2d, Point2d>()
                .unwrap(),
        );
        assert!(line.project(&projection).is_none());
    }

    #[test]
    fn geom_projects_through_trait() {
        let projection = InvertedProjection::new(
            Crs::WGS84
                .get_projection::<GeoPoint2d, Point2d>()
                .unwrap(),
        );

        let point: Geom<Point2d> = Point2d::new(13.4, 52.5).into();
        let Some(Geom::Point(projected)) = Geometry::project(&point, &projection) else {
            panic!("point expected");
        };
        assert_eq!(projected.lon(), 13.4);
        assert_eq!(projected.lat(), 52.5);

        let points: Geom<Point2d> =
            MultiPoint::from(vec![Point2d::new(1.0, 2.0), Point2d::new(3.0, 4.0)]).into();
        let projected = Geometry::project(&points, &projection).unwrap();
        assert_eq!(projected.vertex_count(), 2);
        assert_eq!(projected.type_name(), "MultiPoint");
    }

    #[test]
    fn bounding_rectangle_and_counts() {
        let geom: Geom<Point2d> = square_with_hole().into();
        assert_eq!(geom.vertex_count(), 8);
        assert_eq!(geom.type_name(), "Polygon");
        assert_eq!(
            geom.bounding_rectangle(),
            Some(Rect::new(0.0, 0.0, 10.0, 10.0))
        );

        let empty: Geom<Point2d> = MultiPoint::from(vec![]).into();
        assert!(empty.is_empty());
        assert_eq!(empty.bounding_rectangle(), None);
    }
}
