use std::collections::BTreeSet;

use export2kml_types::geo::Crs;

use super::{SourceFeature, VectorLayer};

/// Vector layer that keeps all its features in memory.
#[derive(Debug, Clone)]
pub struct MemoryVectorLayer {
    name: String,
    crs: Crs,
    features: Vec<SourceFeature>,
}

impl MemoryVectorLayer {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>, crs: Crs) -> Self {
        Self {
            name: name.into(),
            crs,
            features: vec![],
        }
    }

    /// Adds a feature to the layer.
    pub fn with_feature(mut self, feature: SourceFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// Adds a feature to the layer.
    pub fn push(&mut self, feature: SourceFeature) {
        self.features.push(feature);
    }

    /// Number of features in the layer.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the layer has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Extend<SourceFeature> for MemoryVectorLayer {
    fn extend<T: IntoIterator<Item = SourceFeature>>(&mut self, iter: T) {
        self.features.extend(iter);
    }
}

impl VectorLayer for MemoryVectorLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn field_names(&self) -> Vec<String> {
        self.features
            .iter()
            .flat_map(|f| f.attributes.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    fn features(&self) -> Box<dyn Iterator<Item = SourceFeature> + '_> {
        Box::new(self.features.iter().cloned())
    }
}
