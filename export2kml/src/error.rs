//! Error types used by the crate.
//!
//! Errors are split by the scope they affect. [`FieldMappingError`] only skips one feature, [`LayerError`] skips
//! one layer, and [`ExportError`] fails the whole export job. Everything below the job level is recorded in the
//! [`ExportReport`](crate::ExportReport) instead of being returned.

use std::path::PathBuf;

use export2kml_types::geo::Crs;
use thiserror::Error;

use crate::mapping::KmlProperty;
use crate::report::ExportReport;

/// The job cannot be started with the given configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The job contains no layers.
    #[error("no layers selected for export")]
    NoLayers,
    /// Target path is empty or points to a directory.
    #[error("invalid output path {0:?}")]
    InvalidTarget(PathBuf),
    /// Directory of the target path does not exist.
    #[error("output directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
    /// Target directory does not accept new files.
    #[error("output directory {path:?} is not writable: {source}")]
    NotWritable {
        /// Directory that was probed.
        path: PathBuf,
        /// Error returned by the probe.
        source: std::io::Error,
    },
}

/// Coordinates of a layer cannot be converted into longitude and latitude.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// There is no known transformation from the layer's coordinate system.
    #[error("no transformation from {0} to geographic coordinates")]
    UnsupportedCrs(Crs),
    /// A coordinate is outside of the domain of the transformation.
    #[error("coordinate ({x}, {y}) cannot be transformed from {crs} to geographic coordinates")]
    OutOfDomain {
        /// Coordinate system of the layer.
        crs: Crs,
        /// X coordinate of the failed point.
        x: f64,
        /// Y coordinate of the failed point.
        y: f64,
    },
    /// The raster grid has zero size or a degenerate geotransform.
    #[error("raster grid is empty or degenerate")]
    DegenerateGrid,
}

/// A raster layer cannot be rendered into an overlay image.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer does not know how to render this layer.
    #[error("renderer does not support layer {0:?}")]
    UnsupportedLayer(String),
    /// Layer data or style cannot be read.
    #[error("failed to render layer: {0}")]
    Style(String),
    /// The renderer returned a buffer that does not match the requested size.
    #[error("renderer returned {actual} bytes, expected {expected}")]
    BufferSize {
        /// Expected length of the RGBA buffer.
        expected: usize,
        /// Actual length of the RGBA buffer.
        actual: usize,
    },
    /// Encoding of the rendered image failed.
    #[error("failed to encode overlay image: {0}")]
    Encode(#[from] image::ImageError),
    /// Writing the image into the temporary directory failed.
    #[error("failed to write overlay image: {0}")]
    Io(#[from] std::io::Error),
}

/// A mapped property value cannot be resolved for a feature.
#[derive(Debug, Error, PartialEq)]
pub enum FieldMappingError {
    /// The attribute referenced by the mapping is not present in the feature.
    #[error("feature {feature}: attribute {attribute:?} mapped to {property} does not exist")]
    MissingAttribute {
        /// Id of the feature.
        feature: String,
        /// Mapped property.
        property: KmlProperty,
        /// Referenced attribute.
        attribute: String,
    },
    /// The value cannot be converted into the type of the property.
    #[error("feature {feature}: value {value:?} of field {field:?} is not a valid {property} ({expected})")]
    InvalidValue {
        /// Id of the feature.
        feature: String,
        /// Mapped property.
        property: KmlProperty,
        /// Attribute the value was read from, or the property name for literal and computed values.
        field: String,
        /// The offending value.
        value: String,
        /// Description of the expected format.
        expected: &'static str,
    },
}

/// The output file cannot be written.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// Overlay images were given for plain KML output.
    #[error("plain KML output cannot contain {0} overlay image(s)")]
    ImagesInKml(usize),
    /// Document references an image that is not packaged.
    #[error("overlay references {0:?} which is not in the archive")]
    DanglingReference(String),
    /// Image is packaged but no overlay references it.
    #[error("image {0:?} is not referenced by any overlay")]
    OrphanedImage(String),
    /// Two images or two overlays use the same archive path.
    #[error("archive path {0:?} is used more than once")]
    DuplicateEntry(String),
    /// Serialization of the document failed.
    #[error("failed to serialize document: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Zip archive error.
    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// I/O error while writing the output.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Error that causes a single layer to be skipped.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Coordinates cannot be transformed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// Raster cannot be rendered.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Error that fails the whole export job.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Pre-flight validation failed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Output file cannot be written.
    #[error(transparent)]
    Packaging(#[from] PackagingError),
    /// None of the layers could be exported. The report lists the reason for every layer.
    #[error("none of the {} layer(s) could be exported", .0.layers().len())]
    NothingExported(ExportReport),
    /// The export was cancelled by the user.
    #[error("export cancelled")]
    Cancelled,
    /// The job is already running.
    #[error("export job is already running")]
    ConcurrentJob,
    /// Temporary directory for overlay images cannot be created.
    #[error("failed to create temporary directory: {0}")]
    TempDir(std::io::Error),
}

/// A source layer cannot be loaded.
#[cfg(feature = "geojson")]
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source file cannot be read.
    #[error("failed to read layer source: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not valid GeoJSON.
    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
}
