//! Export of styled vector and raster layers into KML and KMZ files.
//!
//! # Quick start
//!
//! ```no_run
//! use export2kml::{ExportJob, FieldMapping, KmlProperty, LayerRef, MemoryVectorLayer, OutputFormat, SourceFeature};
//! use export2kml::export2kml_types::cartesian::Point2d;
//! use export2kml::export2kml_types::geo::Crs;
//!
//! let roads = MemoryVectorLayer::new("Roads", Crs::WGS84)
//!     .with_feature(SourceFeature::new(Point2d::new(10.0, 50.0)).with_attribute("street_name", "Main St"));
//! let mapping = FieldMapping::new().with_attribute(KmlProperty::Name, "street_name");
//!
//! let summary = ExportJob::new("roads.kml", OutputFormat::Kml)
//!     .with_layer(LayerRef::vector(roads), mapping)
//!     .run(&|_: usize, _: usize| {}, &|| false)
//!     .unwrap();
//! println!("{}", summary.report);
//! ```
//!
//! # How it works
//!
//! An [`ExportJob`] takes a list of layers, each with its own [`FieldMapping`], and processes them in order:
//!
//! * features of [vector layers](VectorLayer) are converted into geographic coordinates by the
//!   [`CoordinateAdapter`](adapter::CoordinateAdapter) and become placemarks, with their properties resolved from
//!   the mapping;
//! * [raster layers](RasterLayer) are rendered into PNG images by a [`RasterRenderer`](render::RasterRenderer)
//!   and become ground overlays.
//!
//! The results are collected into a [`KmlDocument`](kml::KmlDocument), with a folder per layer, and written as a
//! plain KML file or a KMZ archive containing the document and the images.
//!
//! A layer that cannot be exported does not stop the job. What happened to every layer is recorded in the
//! [`ExportReport`] returned with the result.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod adapter;
mod color;
pub mod error;
pub mod ids;
mod job;
pub mod kml;
pub mod layer;
pub mod mapping;
mod options;
mod package;
pub mod raster;
pub mod render;
mod report;
pub mod translate;
mod workspace;

#[cfg(test)]
pub(crate) mod tests;

pub use color::Color;
pub use error::ExportError;
pub use job::{Cancellation, ExportJob, ExportSummary, JobState, ProgressSink};
pub use layer::{
    AttributeValue, GeoTransform, LayerKind, LayerRef, MemoryVectorLayer, RasterGrid, RasterLayer, SourceFeature,
    VectorLayer,
};
pub use mapping::{Computed, FieldMapping, KmlProperty, MappingValue};
pub use options::{ExportOptions, RasterOptions, Resampling};
pub use package::{package, OutputFormat};
pub use report::{ExportReport, FeatureIssue, IssueKind, LayerReport, LayerStatus};
pub use workspace::{ImageSlot, Workspace};

#[cfg(feature = "geojson")]
pub use layer::GeoJsonLayer;

// Reexport export2kml_types
pub use export2kml_types;
