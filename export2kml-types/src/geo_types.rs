//! Conversions from [`geo_types`] geometries, so that layers built with the georust ecosystem can be exported
//! directly.

use crate::cartesian::Point2d;
use crate::error::TypesError;
use crate::impls::{ClosedContour, Contour, MultiContour, MultiPoint, MultiPolygon, Polygon};
use crate::Geom;

fn point(coord: &geo_types::Coord<f64>) -> Point2d {
    Point2d::new(coord.x, coord.y)
}

fn ring(line: &geo_types::LineString<f64>) -> ClosedContour<Point2d> {
    ClosedContour::new(line.0.iter().map(point).collect())
}

impl From<&geo_types::LineString<f64>> for Contour<Point2d> {
    fn from(value: &geo_types::LineString<f64>) -> Self {
        Contour::open(value.0.iter().map(point).collect())
    }
}

impl From<&geo_types::Polygon<f64>> for Polygon<Point2d> {
    fn from(value: &geo_types::Polygon<f64>) -> Self {
        Polygon::new(
            ring(value.exterior()),
            value.interiors().iter().map(ring).collect(),
        )
    }
}

impl TryFrom<&geo_types::Geometry<f64>> for Geom<Point2d> {
    type Error = TypesError;

    fn try_from(value: &geo_types::Geometry<f64>) -> Result<Self, Self::Error> {
        use geo_types::Geometry as G;

        Ok(match value {
            G::Point(p) => Geom::Point(point(&p.0)),
            G::Line(l) => Geom::Contour(Contour::open(vec![point(&l.start), point(&l.end)])),
            G::LineString(l) => Geom::Contour(l.into()),
            G::Polygon(p) => Geom::Polygon(p.into()),
            G::MultiPoint(mp) => Geom::MultiPoint(MultiPoint::from(
                mp.0.iter().map(|p| point(&p.0)).collect::<Vec<_>>(),
            )),
            G::MultiLineString(ml) => Geom::MultiContour(MultiContour::from(
                ml.0.iter().map(Contour::from).collect::<Vec<_>>(),
            )),
            G::MultiPolygon(mp) => Geom::MultiPolygon(MultiPolygon::from(
                mp.0.iter().map(Polygon::from).collect::<Vec<_>>(),
            )),
            G::Rect(r) => Geom::Polygon(Polygon::from(&r.to_polygon())),
            G::Triangle(t) => Geom::Polygon(Polygon::from(&t.to_polygon())),
            G::GeometryCollection(_) => {
                return Err(TypesError::Conversion(
                    "geometry collections are not supported".into(),
                ))
            }
        })
    }
}
