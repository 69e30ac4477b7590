//! Conversion of layer coordinates into the longitude/latitude space used by KML.

use export2kml_types::cartesian::{Point2d, Rect};
use export2kml_types::geo::{Crs, GeoPoint, GeoPoint2d, InvertedProjection, NewGeoPoint, Projection};
use export2kml_types::{Geom, Geometry};
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::layer::RasterGrid;

/// Number of segments every edge of a raster grid is split into when its footprint is projected.
const EDGE_SEGMENTS: usize = 16;

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    /// Northern latitude.
    pub north: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Western longitude.
    pub west: f64,
}

impl GeoBox {
    /// Creates a box from a rectangle with longitudes along `x` and latitudes along `y`.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            north: rect.y_max(),
            south: rect.y_min(),
            east: rect.x_max(),
            west: rect.x_min(),
        }
    }

    /// Smallest box containing all the points. Returns `None` if there are no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a GeoPoint2d>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    north: p.lat(),
                    south: p.lat(),
                    east: p.lon(),
                    west: p.lon(),
                },
                Some(b) => Self {
                    north: b.north.max(p.lat()),
                    south: b.south.min(p.lat()),
                    east: b.east.max(p.lon()),
                    west: b.west.min(p.lon()),
                },
            })
        })
    }

    /// Extent in longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Extent in latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center of the box.
    pub fn center(&self) -> GeoPoint2d {
        GeoPoint2d::latlon(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    /// Returns true if the point is inside the box or on its border.
    pub fn contains(&self, point: &impl GeoPoint<Num = f64>) -> bool {
        self.south <= point.lat()
            && self.north >= point.lat()
            && self.west <= point.lon()
            && self.east >= point.lon()
    }

    /// Returns true if all the coordinates are finite and the box is not inverted.
    pub fn is_valid(&self) -> bool {
        [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite())
            && self.north >= self.south
            && self.east >= self.west
    }
}

/// Geographic footprint of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    /// Bounding box of the footprint.
    pub bbox: GeoBox,
    /// Rotation of the raster grid in degrees counter-clockwise. Zero for north-up grids.
    pub rotation: f64,
}

/// Converts geometries and raster footprints from the coordinate system of a layer into longitude and latitude.
pub struct CoordinateAdapter {
    crs: Crs,
    projection: InvertedProjection<dyn Projection<InPoint = GeoPoint2d, OutPoint = Point2d>>,
}

impl CoordinateAdapter {
    /// Creates an adapter for the given coordinate system.
    pub fn new(crs: &Crs) -> Result<Self, ProjectionError> {
        let projection = crs
            .get_projection::<GeoPoint2d, Point2d>()
            .ok_or_else(|| ProjectionError::UnsupportedCrs(crs.clone()))?;

        Ok(Self {
            crs: crs.clone(),
            projection: InvertedProjection::new(projection),
        })
    }

    /// Coordinate system of the source coordinates.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Converts one point into geographic coordinates.
    pub fn point_to_geographic(&self, point: &Point2d) -> Result<GeoPoint2d, ProjectionError> {
        self.projection
            .project(point)
            .filter(|p| p.is_finite())
            .ok_or_else(|| self.out_of_domain(point))
    }

    /// Converts a geographic point into the source coordinates.
    pub fn from_geographic(&self, point: &GeoPoint2d) -> Option<Point2d> {
        self.projection
            .unproject(point)
            .filter(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Converts the geometry into geographic coordinates, keeping the number and order of vertices.
    pub fn to_geographic(&self, geometry: &Geom<Point2d>) -> Result<Geom<GeoPoint2d>, ProjectionError> {
        if let Some(projected) = geometry.project(&self.projection) {
            let mut valid = true;
            projected.for_each_point(|p| valid &= p.is_finite());
            if valid {
                return Ok(projected);
            }
        }

        let mut failed = None;
        geometry.for_each_point(|p| {
            if failed.is_none() && self.point_to_geographic(p).is_err() {
                failed = Some(*p);
            }
        });

        Err(self.out_of_domain(&failed.unwrap_or_else(|| Point2d::new(f64::NAN, f64::NAN))))
    }

    /// Computes the geographic footprint of a raster grid.
    ///
    /// Edges of the grid are densified before projecting, so the box contains the whole footprint even if the
    /// edges become curves in geographic coordinates.
    pub fn extent_to_geographic(&self, grid: &RasterGrid) -> Result<GeoExtent, ProjectionError> {
        if grid.is_degenerate() {
            return Err(ProjectionError::DegenerateGrid);
        }

        let w = grid.size.width() as f64;
        let h = grid.size.height() as f64;
        let mut points = Vec::with_capacity(4 * (EDGE_SEGMENTS + 1));
        for i in 0..=EDGE_SEGMENTS {
            let t = i as f64 / EDGE_SEGMENTS as f64;
            for (col, row) in [(t * w, 0.0), (t * w, h), (0.0, t * h), (w, t * h)] {
                let source = grid.transform.apply(col, row);
                points.push(self.point_to_geographic(&source)?);
            }
        }

        let bbox = GeoBox::from_points(&points).ok_or(ProjectionError::DegenerateGrid)?;
        if !bbox.is_valid() {
            return Err(ProjectionError::DegenerateGrid);
        }

        Ok(GeoExtent {
            bbox,
            rotation: grid.transform.rotation(),
        })
    }

    fn out_of_domain(&self, point: &Point2d) -> ProjectionError {
        ProjectionError::OutOfDomain {
            crs: self.crs.clone(),
            x: point.x,
            y: point.y,
        }
    }
}

impl std::fmt::Debug for CoordinateAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateAdapter")
            .field("crs", &self.crs)
            .finish()
    }
}

/// Converts a geometry from `crs` into geographic coordinates.
pub fn to_geographic(geometry: &Geom<Point2d>, crs: &Crs) -> Result<Geom<GeoPoint2d>, ProjectionError> {
    CoordinateAdapter::new(crs)?.to_geographic(geometry)
}

/// Computes the geographic footprint of a raster grid in `crs`.
pub fn extent_to_geographic(grid: &RasterGrid, crs: &Crs) -> Result<GeoExtent, ProjectionError> {
    CoordinateAdapter::new(crs)?.extent_to_geographic(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::GeoTransform;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use export2kml_types::cartesian::Size;
    use export2kml_types::impls::Contour;

    #[test]
    fn geographic_is_identity() {
        let line = Geom::Contour(Contour::open(vec![
            Point2d::new(10.0, 50.0),
            Point2d::new(11.0, 51.0),
        ]));
        let Geom::Contour(projected) = to_geographic(&line, &Crs::WGS84).unwrap() else {
            panic!("contour expected");
        };
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0], GeoPoint2d::latlon(50.0, 10.0));
        assert_eq!(projected[1], GeoPoint2d::latlon(51.0, 11.0));
    }

    #[test]
    fn web_mercator_to_geographic() {
        let point = Geom::Point(Point2d::new(4_186_726.05, 7_509_135.4));
        let Geom::Point(projected) = to_geographic(&point, &Crs::EPSG3857).unwrap() else {
            panic!("point expected");
        };
        assert_abs_diff_eq!(projected.lon(), 37.61, epsilon = 1e-6);
        assert_abs_diff_eq!(projected.lat(), 55.75, epsilon = 1e-2);
    }

    #[test]
    fn unsupported_crs() {
        let crs = Crs::from_epsg(2056);
        assert_matches!(
            CoordinateAdapter::new(&crs),
            Err(ProjectionError::UnsupportedCrs(_))
        );
    }

    #[test]
    fn out_of_domain_point() {
        let point = Geom::Point(Point2d::new(10.0, 95.0));
        assert_matches!(
            to_geographic(&point, &Crs::WGS84),
            Err(ProjectionError::OutOfDomain { y, .. }) if y == 95.0
        );
    }

    #[test]
    fn north_up_extent_is_exact() {
        let grid = RasterGrid::new(
            Size::new(200, 100),
            GeoTransform::north_up(10.0, 50.0, 0.01, 0.01),
        );
        let extent = extent_to_geographic(&grid, &Crs::WGS84).unwrap();
        assert_eq!(extent.rotation, 0.0);
        assert_abs_diff_eq!(extent.bbox.west, 10.0);
        assert_abs_diff_eq!(extent.bbox.east, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extent.bbox.north, 50.0);
        assert_abs_diff_eq!(extent.bbox.south, 49.0, epsilon = 1e-9);
    }

    #[test]
    fn projected_extent_contains_every_pixel() {
        let grid = RasterGrid::new(
            Size::new(64, 64),
            GeoTransform::north_up(1_000_000.0, 6_500_000.0, 1000.0, 1000.0),
        );
        let adapter = CoordinateAdapter::new(&Crs::EPSG3857).unwrap();
        let extent = adapter.extent_to_geographic(&grid).unwrap();
        for row in 0..=64 {
            for col in 0..=64 {
                let source = grid.transform.apply(col as f64, row as f64);
                let point = adapter.point_to_geographic(&source).unwrap();
                assert!(extent.bbox.contains(&point), "{point:?} is outside of {:?}", extent.bbox);
            }
        }
    }

    #[test]
    fn degenerate_grid() {
        let grid = RasterGrid::new(Size::new(0, 64), GeoTransform::north_up(0.0, 0.0, 1.0, 1.0));
        assert_matches!(
            extent_to_geographic(&grid, &Crs::WGS84),
            Err(ProjectionError::DegenerateGrid)
        );
    }
}
