use crate::cartesian::NewCartesianPoint2d;
use crate::error::TypesError;
use crate::geo::datum::Datum;
use crate::geo::projection::{IdentityProjection, Projection, WebMercator};
use crate::geo::NewGeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Coordinate reference system of a layer.
///
/// A CRS is identified by a string: either an EPSG code (`EPSG:4326`) or a
/// [geodesy](https://docs.rs/geodesy) operator definition that projects geographic coordinates into the layer's
/// coordinates (`tmerc lon_0=9 k_0=0.9996 x_0=500000`).
///
/// ```
/// use export2kml_types::geo::Crs;
///
/// let crs: Crs = "EPSG:3857".parse().unwrap();
/// assert_eq!(crs, Crs::EPSG3857);
/// assert_eq!(crs.to_string(), "EPSG:3857");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    datum: Datum,
    projection_type: ProjectionType,
}

/// Method of projecting geographic coordinates into the coordinates of a [`Crs`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProjectionType {
    /// Coordinates are longitude and latitude in degrees.
    None,
    /// Spherical Web Mercator.
    WebMercator,
    /// Universal Transverse Mercator zone.
    Utm {
        /// Zone number, 1 to 60.
        zone: u8,
        /// Southern hemisphere zone (false northing of 10 000 km).
        south: bool,
    },
    /// Geodesy operator definition.
    Other(String),
    /// Coordinate system that is recognized by its identifier but cannot be transformed.
    Unknown(String),
}

impl Crs {
    /// Geographic coordinates on the WGS84 ellipsoid (EPSG:4326).
    pub const WGS84: Crs = Crs {
        datum: Datum::WGS84,
        projection_type: ProjectionType::None,
    };

    /// Web Mercator (EPSG:3857).
    pub const EPSG3857: Crs = Crs {
        datum: Datum::WGS84,
        projection_type: ProjectionType::WebMercator,
    };

    /// Creates a new CRS.
    pub fn new(datum: Datum, projection_type: ProjectionType) -> Self {
        Self {
            datum,
            projection_type,
        }
    }

    /// Creates a CRS from an EPSG code. Codes without a known transformation give a CRS with
    /// [`ProjectionType::Unknown`].
    pub fn from_epsg(code: u32) -> Self {
        let projection_type = match code {
            4326 | 4258 | 4269 | 4283 | 4617 | 4979 => ProjectionType::None,
            3857 | 3785 | 900913 | 102100 => ProjectionType::WebMercator,
            32601..=32660 => ProjectionType::Utm {
                zone: (code - 32600) as u8,
                south: false,
            },
            32701..=32760 => ProjectionType::Utm {
                zone: (code - 32700) as u8,
                south: true,
            },
            _ => ProjectionType::Unknown(format!("EPSG:{code}")),
        };

        Self::new(Datum::WGS84, projection_type)
    }

    /// Creates a CRS from a geodesy operator definition.
    pub fn custom(definition: impl Into<String>) -> Self {
        Self::new(Datum::WGS84, ProjectionType::Other(definition.into()))
    }

    /// Datum of the CRS.
    pub fn datum(&self) -> Datum {
        self.datum
    }

    /// Projection type of the CRS.
    pub fn projection_type(&self) -> &ProjectionType {
        &self.projection_type
    }

    /// Returns true if the coordinates of this CRS are longitude and latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        self.projection_type == ProjectionType::None
    }

    /// Returns the projection from geographic coordinates into the coordinates of this CRS, or `None` if there is no
    /// known transformation.
    pub fn get_projection<In, Out>(
        &self,
    ) -> Option<Box<dyn Projection<InPoint = In, OutPoint = Out>>>
    where
        In: NewGeoPoint + 'static,
        Out: NewCartesianPoint2d + 'static,
    {
        match &self.projection_type {
            ProjectionType::None => Some(Box::new(IdentityProjection::new())),
            ProjectionType::WebMercator => Some(Box::new(WebMercator::new(self.datum))),
            #[cfg(feature = "geodesy")]
            ProjectionType::Utm { zone, south } => {
                Self::geodesy_projection(&utm_definition(*zone, *south))
            }
            #[cfg(feature = "geodesy")]
            ProjectionType::Other(definition) => Self::geodesy_projection(definition),
            _ => None,
        }
    }

    #[cfg(feature = "geodesy")]
    fn geodesy_projection<In, Out>(
        definition: &str,
    ) -> Option<Box<dyn Projection<InPoint = In, OutPoint = Out>>>
    where
        In: NewGeoPoint + 'static,
        Out: NewCartesianPoint2d + 'static,
    {
        let projection = crate::geo::projection::GeodesyProjection::new(definition)?;
        Some(Box::new(projection))
    }
}

#[cfg(feature = "geodesy")]
fn utm_definition(zone: u8, south: bool) -> String {
    let central_meridian = zone as i32 * 6 - 183;
    let false_northing = if south { 10_000_000 } else { 0 };
    format!(
        "tmerc lon_0={central_meridian} k_0=0.9996 x_0=500000 y_0={false_northing} ellps=WGS84"
    )
}

impl Display for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.projection_type {
            ProjectionType::None => write!(f, "EPSG:4326"),
            ProjectionType::WebMercator => write!(f, "EPSG:3857"),
            ProjectionType::Utm { zone, south } => {
                let base = if *south { 32700 } else { 32600 };
                write!(f, "EPSG:{}", base + *zone as u32)
            }
            ProjectionType::Other(definition) => write!(f, "{definition}"),
            ProjectionType::Unknown(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Crs {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypesError::InvalidCrs(s.to_string()));
        }

        if s.eq_ignore_ascii_case("WGS84") || s.eq_ignore_ascii_case("CRS84") {
            return Ok(Self::WGS84);
        }

        if let Some((authority, code)) = s.split_once(':') {
            if authority.eq_ignore_ascii_case("EPSG") {
                let code = code
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TypesError::InvalidCrs(s.to_string()))?;
                return Ok(Self::from_epsg(code));
            }
        }

        Ok(Self::custom(s))
    }
}

impl TryFrom<String> for Crs {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartesian::Point2d;
    use crate::geo::{GeoPoint, GeoPoint2d};
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    #[test]
    fn parse_epsg_codes() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("epsg:900913".parse::<Crs>().unwrap(), Crs::EPSG3857);
        assert_eq!(
            "EPSG:32733".parse::<Crs>().unwrap().projection_type(),
            &ProjectionType::Utm {
                zone: 33,
                south: true
            }
        );
        assert_matches!(
            "EPSG:2056".parse::<Crs>().unwrap().projection_type(),
            ProjectionType::Unknown(_)
        );
        assert_matches!("EPSG:abc".parse::<Crs>(), Err(TypesError::InvalidCrs(_)));
        assert_matches!("".parse::<Crs>(), Err(TypesError::InvalidCrs(_)));
    }

    #[test]
    fn display_round_trip() {
        for id in ["EPSG:4326", "EPSG:3857", "EPSG:32633", "EPSG:32701"] {
            assert_eq!(id.parse::<Crs>().unwrap().to_string(), id);
        }
    }

    #[test]
    fn unknown_crs_has_no_projection() {
        let crs = Crs::from_epsg(2056);
        assert!(crs.get_projection::<GeoPoint2d, Point2d>().is_none());
    }

    #[test]
    fn utm_projection() {
        let crs = Crs::from_epsg(32633);
        let projection = crs.get_projection::<GeoPoint2d, Point2d>().unwrap();
        let point = projection.unproject(&Point2d::new(500_000.0, 0.0)).unwrap();
        assert_abs_diff_eq!(point.lon(), 15.0, epsilon = 1e-7);
        assert_abs_diff_eq!(point.lat(), 0.0, epsilon = 1e-7);

        let crs = Crs::from_epsg(32733);
        let projection = crs.get_projection::<GeoPoint2d, Point2d>().unwrap();
        let point = projection
            .unproject(&Point2d::new(500_000.0, 10_000_000.0))
            .unwrap();
        assert_abs_diff_eq!(point.lat(), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn geographic_projection_swaps_axes() {
        let projection = Crs::WGS84.get_projection::<GeoPoint2d, Point2d>().unwrap();
        let point = projection.unproject(&Point2d::new(10.0, 50.0)).unwrap();
        assert_eq!(point.lat(), 50.0);
        assert_eq!(point.lon(), 10.0);
        assert!(projection.unproject(&Point2d::new(10.0, 95.0)).is_none());
    }
}
