use std::path::Path;
use std::str::FromStr;

use export2kml_types::cartesian::Point2d;
use export2kml_types::geo::Crs;
use export2kml_types::impls::{ClosedContour, Contour, MultiContour, MultiPoint, MultiPolygon, Polygon};
use export2kml_types::Geom;
use geojson::{feature, FeatureCollection, GeoJson, JsonObject, Value};

use super::{AttributeValue, Attributes, SourceFeature, VectorLayer};
use crate::error::SourceError;

/// Vector layer read from a GeoJSON document.
///
/// Coordinates are in WGS84 unless the document carries a legacy `crs` member naming an EPSG code.
#[derive(Debug, Clone)]
pub struct GeoJsonLayer {
    name: String,
    crs: Crs,
    features: Vec<SourceFeature>,
}

impl GeoJsonLayer {
    /// Reads the layer from a file. The file stem is used as the layer name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "layer".to_string());
        let text = std::fs::read_to_string(path)?;
        Self::parse(name, &text)
    }

    /// Parses a GeoJSON document. Both a feature collection and a single feature are accepted.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, SourceError> {
        let name = name.into();
        let collection = match GeoJson::from_str(text)? {
            GeoJson::FeatureCollection(collection) => collection,
            GeoJson::Feature(feature) => FeatureCollection {
                bbox: None,
                features: vec![feature],
                foreign_members: None,
            },
            GeoJson::Geometry(geometry) => FeatureCollection {
                bbox: None,
                features: vec![geojson::Feature::from(geometry)],
                foreign_members: None,
            },
        };

        let crs = collection
            .foreign_members
            .as_ref()
            .and_then(legacy_crs)
            .unwrap_or(Crs::WGS84);

        let features = collection
            .features
            .into_iter()
            .map(|f| {
                let (geometry, altitudes) = match f.geometry.and_then(|g| convert_geometry(&g.value)) {
                    Some((geometry, altitudes)) => (Some(geometry), altitudes),
                    None => (None, None),
                };
                SourceFeature {
                    id: f.id.map(|id| match id {
                        feature::Id::String(s) => s,
                        feature::Id::Number(n) => n.to_string(),
                    }),
                    geometry,
                    altitudes,
                    attributes: f.properties.map(convert_properties).unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Loaded GeoJSON layer {name} with {} features in {crs}",
            features.len()
        );

        Ok(Self {
            name,
            crs,
            features,
        })
    }
}

impl VectorLayer for GeoJsonLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .features
            .iter()
            .flat_map(|f| f.attributes.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn features(&self) -> Box<dyn Iterator<Item = SourceFeature> + '_> {
        Box::new(self.features.iter().cloned())
    }
}

fn legacy_crs(members: &JsonObject) -> Option<Crs> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    if name.ends_with("CRS84") {
        return Some(Crs::WGS84);
    }

    let code = name.rsplit(':').next()?.parse::<u32>().ok()?;
    Some(Crs::from_epsg(code))
}

fn convert_properties(properties: JsonObject) -> Attributes {
    properties
        .iter()
        .map(|(key, value)| (key.clone(), AttributeValue::from(value)))
        .collect()
}

/// Altitudes of the vertices read so far. `None` for positions without a third value.
type Altitudes = Vec<Option<f64>>;

fn position(position: &[f64], altitudes: &mut Altitudes) -> Option<Point2d> {
    match position {
        [x, y, rest @ ..] => {
            altitudes.push(rest.first().copied());
            Some(Point2d::new(*x, *y))
        }
        _ => None,
    }
}

fn positions(line: &[Vec<f64>], altitudes: &mut Altitudes) -> Option<Vec<Point2d>> {
    line.iter().map(|p| position(p, altitudes)).collect()
}

fn ring(line: &[Vec<f64>], altitudes: &mut Altitudes) -> Option<ClosedContour<Point2d>> {
    let mut points = positions(line, altitudes)?;
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
        altitudes.pop();
    }
    Some(ClosedContour::new(points))
}

fn polygon(rings: &[Vec<Vec<f64>>], altitudes: &mut Altitudes) -> Option<Polygon<Point2d>> {
    let (outer, inner) = rings.split_first()?;
    let outer = ring(outer, altitudes)?;
    let inner = inner
        .iter()
        .map(|r| ring(r, altitudes))
        .collect::<Option<_>>()?;
    Some(Polygon::new(outer, inner))
}

/// Converts the geometry and collects the altitudes of its vertices. Altitudes are returned only if at least
/// one position has them, missing ones are then set to 0.
fn convert_geometry(value: &Value) -> Option<(Geom<Point2d>, Option<Vec<f64>>)> {
    let mut altitudes = Altitudes::new();
    let z = &mut altitudes;
    let geometry = match value {
        Value::Point(p) => Geom::Point(position(p, z)?),
        Value::MultiPoint(points) => Geom::MultiPoint(MultiPoint::from(positions(points, z)?)),
        Value::LineString(line) => Geom::Contour(Contour::open(positions(line, z)?)),
        Value::MultiLineString(lines) => Geom::MultiContour(MultiContour::from(
            lines
                .iter()
                .map(|l| positions(l, z).map(Contour::open))
                .collect::<Option<Vec<_>>>()?,
        )),
        Value::Polygon(rings) => Geom::Polygon(polygon(rings, z)?),
        Value::MultiPolygon(polygons) => Geom::MultiPolygon(MultiPolygon::from(
            polygons
                .iter()
                .map(|p| polygon(p, z))
                .collect::<Option<Vec<_>>>()?,
        )),
        Value::GeometryCollection(_) => {
            log::warn!("GeoJSON geometry collections are not supported, feature geometry is ignored");
            return None;
        }
    };

    let altitudes = altitudes
        .iter()
        .any(Option::is_some)
        .then(|| altitudes.iter().map(|z| z.unwrap_or(0.0)).collect());

    Some((geometry, altitudes))
}
