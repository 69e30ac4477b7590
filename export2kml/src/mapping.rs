//! Mapping of feature attributes onto KML properties.
//!
//! A [`FieldMapping`] is given for every exported layer. It tells, for each [`KmlProperty`], where the value comes
//! from: a literal text, an attribute of the feature or a value computed during the export. Values are resolved
//! per feature and converted into the type the property requires. A value that cannot be converted is an error
//! for that feature only.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldMappingError;
use crate::layer::{AttributeValue, Attributes};

/// Property of a KML placemark or overlay that can be set from a mapping.
///
/// Property names are case-sensitive and follow the names used in KML, except `Name`, which is capitalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KmlProperty {
    /// Display name.
    #[serde(rename = "Name")]
    Name,
    /// Description shown in the balloon.
    #[serde(rename = "description")]
    Description,
    /// Single moment in time.
    #[serde(rename = "timestamp")]
    Timestamp,
    /// Beginning of a time span.
    #[serde(rename = "begin")]
    Begin,
    /// End of a time span.
    #[serde(rename = "end")]
    End,
    /// How altitude of the coordinates is interpreted.
    #[serde(rename = "altitudeMode")]
    AltitudeMode,
    /// Whether lines follow the terrain.
    #[serde(rename = "tessellate")]
    Tessellate,
    /// Whether geometries are connected to the ground.
    #[serde(rename = "extrude")]
    Extrude,
    /// Whether the feature is visible when the document is opened.
    #[serde(rename = "visibility")]
    Visibility,
    /// Stacking order of overlapping overlays.
    #[serde(rename = "drawOrder")]
    DrawOrder,
    /// Icon image of point placemarks.
    #[serde(rename = "icon")]
    Icon,
}

impl KmlProperty {
    /// All properties in the order they are listed to the user.
    pub const ALL: [KmlProperty; 11] = [
        KmlProperty::Name,
        KmlProperty::Description,
        KmlProperty::Timestamp,
        KmlProperty::Begin,
        KmlProperty::End,
        KmlProperty::AltitudeMode,
        KmlProperty::Tessellate,
        KmlProperty::Extrude,
        KmlProperty::Visibility,
        KmlProperty::DrawOrder,
        KmlProperty::Icon,
    ];

    /// Name of the property.
    pub fn as_str(&self) -> &'static str {
        match self {
            KmlProperty::Name => "Name",
            KmlProperty::Description => "description",
            KmlProperty::Timestamp => "timestamp",
            KmlProperty::Begin => "begin",
            KmlProperty::End => "end",
            KmlProperty::AltitudeMode => "altitudeMode",
            KmlProperty::Tessellate => "tessellate",
            KmlProperty::Extrude => "extrude",
            KmlProperty::Visibility => "visibility",
            KmlProperty::DrawOrder => "drawOrder",
            KmlProperty::Icon => "icon",
        }
    }
}

impl Display for KmlProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KmlProperty {
    type Err = UnknownProperty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KmlProperty::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProperty(s.to_string()))
    }
}

/// The string is not a name of a [`KmlProperty`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown KML property {0:?}")]
pub struct UnknownProperty(pub String);

/// Altitude mode of KML geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AltitudeMode {
    /// Altitude is ignored.
    ClampToGround,
    /// Altitude is relative to the terrain.
    RelativeToGround,
    /// Altitude is relative to the sea level.
    Absolute,
}

impl AltitudeMode {
    /// Value used in KML.
    pub fn as_str(&self) -> &'static str {
        match self {
            AltitudeMode::ClampToGround => "clampToGround",
            AltitudeMode::RelativeToGround => "relativeToGround",
            AltitudeMode::Absolute => "absolute",
        }
    }
}

impl FromStr for AltitudeMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "clampToGround" => Ok(Self::ClampToGround),
            "relativeToGround" => Ok(Self::RelativeToGround),
            "absolute" => Ok(Self::Absolute),
            _ => Err(()),
        }
    }
}

/// Time value as allowed in KML `when`, `begin` and `end` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmlTime {
    /// Year only (`YYYY`).
    Year(i32),
    /// Year and month (`YYYY-MM`).
    YearMonth(i32, u32),
    /// Calendar date (`YYYY-MM-DD`).
    Date(NaiveDate),
    /// Full date and time.
    DateTime(DateTime<FixedOffset>),
}

impl KmlTime {
    /// Parses a time value. Besides the KML formats, date and time separated by a space is accepted. Date and time
    /// without a time zone is considered UTC.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self::DateTime(dt));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Some(Self::from_naive(naive));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(Self::Date(date));
        }

        let mut parts = s.split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(year), None, None) if year.len() == 4 => year.parse().ok().map(Self::Year),
            (Some(year), Some(month), None) if year.len() == 4 && month.len() == 2 => {
                let month: u32 = month.parse().ok()?;
                if (1..=12).contains(&month) {
                    Some(Self::YearMonth(year.parse().ok()?, month))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn from_naive(naive: NaiveDateTime) -> Self {
        Self::DateTime(Utc.from_utc_datetime(&naive).into())
    }
}

impl Display for KmlTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KmlTime::Year(year) => write!(f, "{year:04}"),
            KmlTime::YearMonth(year, month) => write!(f, "{year:04}-{month:02}"),
            KmlTime::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            KmlTime::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

/// Value that is known only at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Computed {
    /// Time the export job started.
    Now,
    /// Id of the feature.
    FeatureId,
    /// Name of the layer the feature belongs to.
    LayerName,
}

/// Source of a property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingValue {
    /// The same text for every feature.
    Literal(String),
    /// Value of a feature attribute.
    Attribute {
        /// Name of the attribute.
        name: String,
        /// Text used when the attribute value is null. If not set, the property is omitted for such features.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
    /// Computed value.
    Computed(Computed),
}

impl MappingValue {
    /// Value of the attribute with the given name.
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            fallback: None,
        }
    }

    /// Literal text.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }
}

/// Resolved value of a property, converted into the type the property requires.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Text (`Name`, `description`, `icon`).
    Text(String),
    /// Flag (`tessellate`, `extrude`, `visibility`).
    Bool(bool),
    /// Integer (`drawOrder`).
    Integer(i64),
    /// Time (`timestamp`, `begin`, `end`).
    Time(KmlTime),
    /// Altitude mode.
    AltitudeMode(AltitudeMode),
}

impl PropertyValue {
    /// Text of the value as it is written into KML.
    pub fn to_kml_text(&self) -> String {
        match self {
            PropertyValue::Text(v) => v.clone(),
            PropertyValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            PropertyValue::Integer(v) => v.to_string(),
            PropertyValue::Time(v) => v.to_string(),
            PropertyValue::AltitudeMode(v) => v.as_str().to_string(),
        }
    }
}

/// Property values resolved for one feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedProperties(BTreeMap<KmlProperty, PropertyValue>);

impl ResolvedProperties {
    /// Value of the property, if it is set.
    pub fn get(&self, property: KmlProperty) -> Option<&PropertyValue> {
        self.0.get(&property)
    }

    /// Sets the value of the property.
    pub fn insert(&mut self, property: KmlProperty, value: PropertyValue) {
        self.0.insert(property, value);
    }

    /// Text of the property as written into KML.
    pub fn text(&self, property: KmlProperty) -> Option<String> {
        self.get(property).map(PropertyValue::to_kml_text)
    }

    /// Time value of the property.
    pub fn time(&self, property: KmlProperty) -> Option<KmlTime> {
        match self.get(property) {
            Some(PropertyValue::Time(t)) => Some(*t),
            _ => None,
        }
    }

    /// Altitude mode, if set.
    pub fn altitude_mode(&self) -> Option<AltitudeMode> {
        match self.get(KmlProperty::AltitudeMode) {
            Some(PropertyValue::AltitudeMode(mode)) => Some(*mode),
            _ => None,
        }
    }

    /// Number of set properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no properties are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a mapping value may be resolved from.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Id of the feature.
    pub feature_id: &'a str,
    /// Name of the layer.
    pub layer_name: &'a str,
    /// Attributes of the feature.
    pub attributes: &'a Attributes,
    /// Start time of the export job.
    pub now: DateTime<Utc>,
}

/// Mapping of attributes onto KML properties for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    properties: BTreeMap<KmlProperty, MappingValue>,
    extended_fields: Vec<String>,
    folder_name: Option<String>,
}

impl FieldMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source of a property.
    pub fn with(mut self, property: KmlProperty, value: MappingValue) -> Self {
        self.set(property, value);
        self
    }

    /// Maps an attribute onto the property.
    pub fn with_attribute(self, property: KmlProperty, attribute: impl Into<String>) -> Self {
        self.with(property, MappingValue::attribute(attribute))
    }

    /// Sets the property to a literal text.
    pub fn with_literal(self, property: KmlProperty, text: impl Into<String>) -> Self {
        self.with(property, MappingValue::literal(text))
    }

    /// Adds an attribute that is copied into the `ExtendedData` of every placemark.
    pub fn with_extended_field(mut self, attribute: impl Into<String>) -> Self {
        self.extended_fields.push(attribute.into());
        self
    }

    /// Sets the name of the folder the layer is put into, instead of the layer name.
    pub fn with_folder_name(mut self, name: impl Into<String>) -> Self {
        self.folder_name = Some(name.into());
        self
    }

    /// Sets the source of a property.
    pub fn set(&mut self, property: KmlProperty, value: MappingValue) {
        self.properties.insert(property, value);
    }

    /// Source of the property, if it is mapped.
    pub fn get(&self, property: KmlProperty) -> Option<&MappingValue> {
        self.properties.get(&property)
    }

    /// Iterates over the mapped properties.
    pub fn iter(&self) -> impl Iterator<Item = (KmlProperty, &MappingValue)> {
        self.properties.iter().map(|(p, v)| (*p, v))
    }

    /// Attributes copied into `ExtendedData`.
    pub fn extended_fields(&self) -> &[String] {
        &self.extended_fields
    }

    /// Folder name override.
    pub fn folder_name(&self) -> Option<&str> {
        self.folder_name.as_deref()
    }

    /// Builds a mapping from text entered by the user.
    ///
    /// A value equal to one of `field_names` becomes an attribute reference, anything else a literal text. Empty
    /// values are skipped.
    pub fn from_text<'a>(
        entries: impl IntoIterator<Item = (KmlProperty, &'a str)>,
        field_names: &[String],
    ) -> Self {
        let mut mapping = Self::new();
        for (property, text) in entries {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let value = if field_names.iter().any(|f| f == text) {
                MappingValue::attribute(text)
            } else {
                MappingValue::literal(text)
            };
            mapping.set(property, value);
        }

        mapping
    }

    /// Resolves all mapped properties. Fails on the first value that cannot be resolved.
    pub fn resolve(&self, ctx: &ResolveContext) -> Result<ResolvedProperties, FieldMappingError> {
        let mut resolved = ResolvedProperties::default();
        for (property, value) in &self.properties {
            if let Some(v) = resolve_property(*property, value, ctx)? {
                resolved.insert(*property, v);
            }
        }

        Ok(resolved)
    }

    /// Resolves all mapped properties, skipping the ones that cannot be resolved. Errors for the skipped
    /// properties are returned alongside the result.
    pub fn resolve_lenient(&self, ctx: &ResolveContext) -> (ResolvedProperties, Vec<FieldMappingError>) {
        let mut resolved = ResolvedProperties::default();
        let mut errors = vec![];
        for (property, value) in &self.properties {
            match resolve_property(*property, value, ctx) {
                Ok(Some(v)) => resolved.insert(*property, v),
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }

        (resolved, errors)
    }

    /// Values of the extended data fields present in the feature, in the mapping order.
    pub fn extended_data(&self, attributes: &Attributes) -> Vec<(String, String)> {
        self.extended_fields
            .iter()
            .filter_map(|name| attributes.get(name).map(|v| (name.clone(), v.to_string())))
            .collect()
    }
}

fn resolve_property(
    property: KmlProperty,
    value: &MappingValue,
    ctx: &ResolveContext,
) -> Result<Option<PropertyValue>, FieldMappingError> {
    let raw = match value {
        MappingValue::Literal(text) => AttributeValue::Text(text.clone()),
        MappingValue::Attribute { name, fallback } => match ctx.attributes.get(name) {
            None => {
                return Err(FieldMappingError::MissingAttribute {
                    feature: ctx.feature_id.to_string(),
                    property,
                    attribute: name.clone(),
                })
            }
            Some(AttributeValue::Null) => match fallback {
                Some(text) => AttributeValue::Text(text.clone()),
                None => return Ok(None),
            },
            Some(v) => v.clone(),
        },
        MappingValue::Computed(Computed::Now) => AttributeValue::DateTime(ctx.now.into()),
        MappingValue::Computed(Computed::FeatureId) => AttributeValue::Text(ctx.feature_id.to_string()),
        MappingValue::Computed(Computed::LayerName) => AttributeValue::Text(ctx.layer_name.to_string()),
    };

    let field = match value {
        MappingValue::Attribute { name, .. } => name.as_str(),
        _ => property.as_str(),
    };
    coerce(property, raw, ctx.feature_id, field).map(Some)
}

fn coerce(
    property: KmlProperty,
    value: AttributeValue,
    feature_id: &str,
    field: &str,
) -> Result<PropertyValue, FieldMappingError> {
    let invalid = |value: &AttributeValue, expected: &'static str| FieldMappingError::InvalidValue {
        feature: feature_id.to_string(),
        property,
        field: field.to_string(),
        value: value.to_string(),
        expected,
    };

    match property {
        KmlProperty::Name | KmlProperty::Description | KmlProperty::Icon => {
            Ok(PropertyValue::Text(value.to_string()))
        }
        KmlProperty::Timestamp | KmlProperty::Begin | KmlProperty::End => {
            let time = match &value {
                AttributeValue::DateTime(dt) => Some(KmlTime::DateTime(*dt)),
                AttributeValue::Date(date) => Some(KmlTime::Date(*date)),
                AttributeValue::Integer(year) => i32::try_from(*year)
                    .ok()
                    .filter(|y| (0..=9999).contains(y))
                    .map(KmlTime::Year),
                AttributeValue::Text(text) => KmlTime::parse(text),
                _ => None,
            };
            time.map(PropertyValue::Time)
                .ok_or_else(|| invalid(&value, "date or date and time"))
        }
        KmlProperty::AltitudeMode => match &value {
            AttributeValue::Text(text) => text
                .parse()
                .map(PropertyValue::AltitudeMode)
                .map_err(|_| invalid(&value, "clampToGround, relativeToGround or absolute")),
            _ => Err(invalid(&value, "clampToGround, relativeToGround or absolute")),
        },
        KmlProperty::Tessellate | KmlProperty::Extrude | KmlProperty::Visibility => {
            let flag = match &value {
                AttributeValue::Bool(v) => Some(*v),
                AttributeValue::Integer(v) => Some(*v != 0),
                AttributeValue::Float(v) => Some(*v != 0.0),
                AttributeValue::Text(text) => parse_flag(text),
                _ => None,
            };
            flag.map(PropertyValue::Bool)
                .ok_or_else(|| invalid(&value, "0 or 1"))
        }
        KmlProperty::DrawOrder => {
            let order = match &value {
                AttributeValue::Integer(v) => Some(*v),
                AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
                AttributeValue::Text(text) => text.trim().parse().ok(),
                _ => None,
            };
            order
                .map(PropertyValue::Integer)
                .ok_or_else(|| invalid(&value, "integer"))
        }
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
