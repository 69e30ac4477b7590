//! Source layers given to the exporter by the host application.
//!
//! There are two kinds of layers:
//! * [`VectorLayer`] - a set of features with geometries and attributes. Every feature becomes a placemark.
//! * [`RasterLayer`] - a georeferenced grid, styled by the host. The layer is rendered by a
//!   [`RasterRenderer`](crate::render::RasterRenderer) and becomes a ground overlay.
//!
//! The exporter only reads the layers. They are owned by the host and wrapped into [`LayerRef`] when a job is
//! created.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use export2kml_types::cartesian::{Point2d, Rect};
use export2kml_types::geo::Crs;
use export2kml_types::Geom;
use serde::{Deserialize, Serialize};

mod grid;
mod memory;

#[cfg(feature = "geojson")]
mod geojson;

pub use grid::{GeoTransform, RasterGrid};
pub use memory::MemoryVectorLayer;

#[cfg(feature = "geojson")]
pub use self::geojson::GeoJsonLayer;

/// Attributes of a feature by their names.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Value of a feature attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Attribute is set to null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Date and time with time zone.
    DateTime(DateTime<FixedOffset>),
    /// Calendar date.
    Date(NaiveDate),
    /// String value.
    Text(String),
}

impl AttributeValue {
    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::DateTime(v) => {
                write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            AttributeValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            AttributeValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}

impl From<&serde_json::Value> for AttributeValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(*v),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// A feature read from a vector layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFeature {
    /// Identifier of the feature in the source. If not set, the position of the feature in the layer is used.
    pub id: Option<String>,
    /// Geometry in the coordinates of the layer's CRS.
    pub geometry: Option<Geom<Point2d>>,
    /// Altitude of every vertex of the geometry in meters, in the order of [`Geom::for_each_point`].
    pub altitudes: Option<Vec<f64>>,
    /// Attribute values.
    pub attributes: Attributes,
}

impl SourceFeature {
    /// Creates a feature with the given geometry and no attributes.
    pub fn new(geometry: impl Into<Geom<Point2d>>) -> Self {
        Self {
            id: None,
            geometry: Some(geometry.into()),
            altitudes: None,
            attributes: Attributes::new(),
        }
    }

    /// Sets the id of the feature.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the altitudes of the vertices.
    pub fn with_altitudes(mut self, altitudes: Vec<f64>) -> Self {
        self.altitudes = Some(altitudes);
        self
    }

    /// Sets an attribute value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Layer of geographic features.
pub trait VectorLayer {
    /// Name of the layer, as shown to the user.
    fn name(&self) -> &str;
    /// Coordinate system of the feature geometries.
    fn crs(&self) -> &Crs;
    /// Names of the attributes the features of this layer have.
    fn field_names(&self) -> Vec<String>;
    /// Iterates over the features of the layer. Every call starts from the first feature.
    fn features(&self) -> Box<dyn Iterator<Item = SourceFeature> + '_>;

    /// Extent of the layer in its own coordinates.
    fn extent(&self) -> Option<Rect> {
        self.features()
            .filter_map(|f| f.geometry.and_then(|g| g.bounding_rectangle()))
            .reduce(|a, b| a.merge(b))
    }
}

/// Georeferenced raster layer.
///
/// The exporter does not interpret raster data or styling itself, this is done by a
/// [`RasterRenderer`](crate::render::RasterRenderer). Renderers use [`RasterLayer::as_any`] to get to the
/// concrete layer type they know how to render.
pub trait RasterLayer {
    /// Name of the layer, as shown to the user.
    fn name(&self) -> &str;
    /// Coordinate system of the raster grid.
    fn crs(&self) -> &Crs;
    /// Size and georeferencing of the raster grid.
    fn grid(&self) -> RasterGrid;
    /// Converts the trait object into the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Kind of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Vector layer.
    Vector,
    /// Raster layer.
    Raster,
}

/// Handle to a layer selected for export.
pub enum LayerRef {
    /// Vector layer.
    Vector(Box<dyn VectorLayer>),
    /// Raster layer.
    Raster(Box<dyn RasterLayer>),
}

impl LayerRef {
    /// Wraps a vector layer.
    pub fn vector(layer: impl VectorLayer + 'static) -> Self {
        Self::Vector(Box::new(layer))
    }

    /// Wraps a raster layer.
    pub fn raster(layer: impl RasterLayer + 'static) -> Self {
        Self::Raster(Box::new(layer))
    }

    /// Kind of the layer.
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerRef::Vector(_) => LayerKind::Vector,
            LayerRef::Raster(_) => LayerKind::Raster,
        }
    }

    /// Name of the layer.
    pub fn name(&self) -> &str {
        match self {
            LayerRef::Vector(layer) => layer.name(),
            LayerRef::Raster(layer) => layer.name(),
        }
    }

    /// Coordinate system of the layer.
    pub fn crs(&self) -> &Crs {
        match self {
            LayerRef::Vector(layer) => layer.crs(),
            LayerRef::Raster(layer) => layer.crs(),
        }
    }

    /// Extent of the layer in its own coordinates.
    pub fn extent(&self) -> Option<Rect> {
        match self {
            LayerRef::Vector(layer) => layer.extent(),
            LayerRef::Raster(layer) => layer.grid().envelope(),
        }
    }
}

impl std::fmt::Debug for LayerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRef")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("crs", self.crs())
            .finish()
    }
}
