//! Configuration of an export job.
//!
//! All the options have defaults, so a job can be created without any configuration. The options can also be
//! loaded from JSON (or any other format supported by `serde`) with only some of the fields set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default name of the document entry in KMZ archives.
pub const DEFAULT_DOCUMENT_ENTRY: &str = "doc.kml";
/// Default archive directory of overlay images.
pub const DEFAULT_RASTER_DIR: &str = "rasters";
/// Default maximum side of an overlay image in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Options of an export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Name of the KML document. The target file stem is used if not set.
    pub document_name: Option<String>,
    /// Put the content of every layer into its own folder.
    pub group_by_layer: bool,
    /// Name of the document entry in KMZ archives.
    pub document_entry: String,
    /// Archive directory overlay images are stored in.
    pub raster_dir: String,
    /// Directory temporary files are created in. The system temporary directory is used if not set.
    pub temp_dir: Option<PathBuf>,
    /// Options of raster rendering.
    pub raster: RasterOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            document_name: None,
            group_by_layer: true,
            document_entry: DEFAULT_DOCUMENT_ENTRY.to_string(),
            raster_dir: DEFAULT_RASTER_DIR.to_string(),
            temp_dir: None,
            raster: RasterOptions::default(),
        }
    }
}

/// How a raster grid is turned into a ground overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Resample the rendered image onto a north-up longitude/latitude grid. Works for any coordinate system.
    #[default]
    Warp,
    /// Keep the rendered image as is, without resampling. Only used for north-up geographic rasters, rotated or
    /// projected rasters are warped so the overlay box always covers the whole raster.
    Native,
}

/// Options of raster rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// Maximum width or height of overlay images. Larger rasters are scaled down keeping the aspect ratio.
    pub max_dimension: u32,
    /// Resampling mode.
    pub resampling: Resampling,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            resampling: Resampling::default(),
        }
    }
}
