//! Translation of vector features into placemark records.

use chrono::{DateTime, Utc};
use export2kml_types::geo::GeoPoint2d;
use export2kml_types::{Geom, Geometry};

use crate::adapter::CoordinateAdapter;
use crate::error::ProjectionError;
use crate::ids::{feature_part, IdAllocator};
use crate::layer::{SourceFeature, VectorLayer};
use crate::mapping::{FieldMapping, ResolveContext, ResolvedProperties};
use crate::report::FeatureIssue;

/// Feature ready to be written as a KML placemark.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacemarkRecord {
    /// Id of the placemark, unique within the document.
    pub id: String,
    /// Geometry in geographic coordinates.
    pub geometry: Geom<GeoPoint2d>,
    /// Altitude of every vertex of the geometry, in vertex order.
    pub altitudes: Option<Vec<f64>>,
    /// Mapped properties.
    pub properties: ResolvedProperties,
    /// `ExtendedData` name/value pairs.
    pub extended_data: Vec<(String, String)>,
}

/// Reason a feature did not produce a placemark.
#[derive(Debug)]
pub enum FeatureError {
    /// The feature is skipped, the rest of the layer is still translated.
    Skipped(FeatureIssue),
    /// Coordinates of the feature cannot be transformed. The whole layer is considered failed.
    Projection(ProjectionError),
}

/// Values shared by all records created from one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerContext {
    /// Prefix of the ids of the layer's records. Must be unique among the layers of a document and contain no
    /// dots, see [`IdAllocator::layer_prefix`].
    pub id_prefix: String,
    /// Start time of the job, used for the `now` computed value.
    pub now: DateTime<Utc>,
}

impl LayerContext {
    /// Creates a new context.
    pub fn new(id_prefix: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            now,
        }
    }
}

/// Lazy translation of the features of one layer.
///
/// Features are read from the layer one by one as the iterator advances, so the whole layer is never held in
/// memory. Calling [`translate`] again starts from the first feature.
pub struct Translation<'a> {
    layer: &'a dyn VectorLayer,
    mapping: &'a FieldMapping,
    context: &'a LayerContext,
    adapter: CoordinateAdapter,
    features: Box<dyn Iterator<Item = SourceFeature> + 'a>,
    ids: IdAllocator,
    index: usize,
}

/// Starts translation of the features of the layer.
///
/// Fails immediately if the layer's coordinate system cannot be transformed into geographic coordinates.
pub fn translate<'a>(
    layer: &'a dyn VectorLayer,
    mapping: &'a FieldMapping,
    context: &'a LayerContext,
) -> Result<Translation<'a>, ProjectionError> {
    let adapter = CoordinateAdapter::new(layer.crs())?;
    Ok(Translation {
        layer,
        mapping,
        context,
        adapter,
        features: layer.features(),
        ids: IdAllocator::new(),
        index: 0,
    })
}

impl Translation<'_> {
    fn translate_feature(&mut self, feature: SourceFeature, index: usize) -> Result<PlacemarkRecord, FeatureError> {
        let feature_id = feature.id.unwrap_or_else(|| index.to_string());

        let geometry = match feature.geometry {
            Some(geometry) if !geometry.is_empty() => geometry,
            _ => return Err(FeatureError::Skipped(FeatureIssue::empty_geometry(feature_id))),
        };

        if let Some(altitudes) = &feature.altitudes {
            if altitudes.len() != geometry.vertex_count() {
                return Err(FeatureError::Skipped(FeatureIssue::invalid_geometry(
                    &feature_id,
                    format!(
                        "feature {feature_id} has {} altitude(s) for {} vertices",
                        altitudes.len(),
                        geometry.vertex_count()
                    ),
                )));
            }
        }

        let ctx = ResolveContext {
            feature_id: &feature_id,
            layer_name: self.layer.name(),
            attributes: &feature.attributes,
            now: self.context.now,
        };
        let properties = self
            .mapping
            .resolve(&ctx)
            .map_err(|err| FeatureError::Skipped(FeatureIssue::field_mapping(&feature_id, &err)))?;

        let geometry = self
            .adapter
            .to_geographic(&geometry)
            .map_err(FeatureError::Projection)?;

        let id = format!(
            "{}.{}",
            self.context.id_prefix,
            self.ids.allocate(&feature_part(&feature_id))
        );

        Ok(PlacemarkRecord {
            id,
            geometry,
            altitudes: feature.altitudes,
            properties,
            extended_data: self.mapping.extended_data(&feature.attributes),
        })
    }
}

impl Iterator for Translation<'_> {
    type Item = Result<PlacemarkRecord, FeatureError>;

    fn next(&mut self) -> Option<Self::Item> {
        let feature = self.features.next()?;
        let index = self.index;
        self.index += 1;

        Some(self.translate_feature(feature, index))
    }
}

impl std::fmt::Debug for Translation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translation")
            .field("layer", &self.layer.name())
            .field("context", self.context)
            .field("adapter", &self.adapter)
            .field("index", &self.index)
            .finish()
    }
}
