//! Rendering of raster layers into georeferenced overlay images.

use export2kml_types::cartesian::Size;
use export2kml_types::geo::{GeoPoint2d, NewGeoPoint};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::adapter::{CoordinateAdapter, GeoBox};
use crate::error::{LayerError, ProjectionError, RenderError};
use crate::layer::{RasterGrid, RasterLayer};
use crate::mapping::{FieldMapping, KmlProperty, MappingValue, ResolveContext, ResolvedProperties};
use crate::options::{RasterOptions, Resampling};
use crate::render::RasterRenderer;
use crate::report::{FeatureIssue, IssueKind};
use crate::translate::LayerContext;
use crate::workspace::{ImageSlot, Workspace};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Overlay image written into the temporary workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayImage {
    /// Path inside the output archive.
    pub archive_path: String,
    /// Path of the temporary file.
    pub file: std::path::PathBuf,
    /// Size of the image in pixels.
    pub size: Size<u32>,
}

/// Raster layer ready to be written as a KML ground overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    /// Id of the overlay, unique within the document.
    pub id: String,
    /// Name of the overlay.
    pub name: String,
    /// Overlay image.
    pub image: OverlayImage,
    /// Geographic box the image is stretched over.
    pub bbox: GeoBox,
    /// Rotation of the image in degrees counter-clockwise. Overlays created by the [`Rasterizer`] are always
    /// north-up.
    pub rotation: f64,
    /// Mapped properties.
    pub properties: ResolvedProperties,
}

/// Overlay record together with the problems found while creating it.
#[derive(Debug)]
pub struct RasterOutput {
    /// The overlay.
    pub overlay: OverlayRecord,
    /// Mapped properties that were skipped.
    pub issues: Vec<FeatureIssue>,
}

/// Turns raster layers into overlay images and records.
pub struct Rasterizer<'a> {
    renderer: &'a dyn RasterRenderer,
    options: &'a RasterOptions,
}

impl<'a> Rasterizer<'a> {
    /// Creates a new rasterizer.
    pub fn new(renderer: &'a dyn RasterRenderer, options: &'a RasterOptions) -> Self {
        Self { renderer, options }
    }

    /// Renders the layer into a PNG file in the workspace and builds its overlay record.
    pub fn render(
        &self,
        layer: &dyn RasterLayer,
        mapping: &FieldMapping,
        context: &LayerContext,
        workspace: &mut Workspace,
    ) -> Result<RasterOutput, LayerError> {
        let adapter = CoordinateAdapter::new(layer.crs())?;
        let grid = layer.grid();
        let extent = adapter.extent_to_geographic(&grid)?;

        let render_size = grid.size.fit_within(self.options.max_dimension.max(1));
        let rendered = self.renderer.render(layer, render_size)?;
        if rendered.size != render_size {
            return Err(RenderError::Style(format!(
                "renderer returned {}x{} image instead of {}x{}",
                rendered.size.width(),
                rendered.size.height(),
                render_size.width(),
                render_size.height()
            ))
            .into());
        }
        let rendered = rendered.into_image()?;

        let native = self.options.resampling == Resampling::Native
            && layer.crs().is_geographic()
            && !grid.transform.is_rotated();
        if self.options.resampling == Resampling::Native && !native {
            log::debug!("Layer {} is not a north-up geographic grid and is warped", layer.name());
        }

        let image = if native {
            rendered
        } else {
            warp(&rendered, &grid, &adapter, &extent.bbox)?
        };

        let ImageSlot { archive_path, file } = workspace.allocate(layer.name());
        image
            .save_with_format(&file, ImageFormat::Png)
            .map_err(RenderError::from)?;

        log::debug!(
            "Wrote overlay image {archive_path} ({}x{}) for layer {}",
            image.width(),
            image.height(),
            layer.name()
        );

        let (properties, issues) = self.resolve_properties(layer.name(), mapping, context);
        let name = properties
            .text(KmlProperty::Name)
            .unwrap_or_else(|| layer.name().to_string());

        Ok(RasterOutput {
            overlay: OverlayRecord {
                id: context.id_prefix.clone(),
                name,
                image: OverlayImage {
                    archive_path,
                    file,
                    size: Size::new(image.width(), image.height()),
                },
                bbox: extent.bbox,
                rotation: 0.0,
                properties,
            },
            issues,
        })
    }

    fn resolve_properties(
        &self,
        layer_name: &str,
        mapping: &FieldMapping,
        context: &LayerContext,
    ) -> (ResolvedProperties, Vec<FeatureIssue>) {
        let mut issues = vec![];
        let mut applicable = FieldMapping::new();
        for (property, value) in mapping.iter() {
            if let MappingValue::Attribute { name, .. } = value {
                issues.push(FeatureIssue {
                    feature_id: layer_name.to_string(),
                    kind: IssueKind::FieldMapping,
                    message: format!("raster layers have no attributes, {property} mapped to {name:?} is ignored"),
                });
                continue;
            }
            applicable.set(property, value.clone());
        }

        let attributes = Default::default();
        let ctx = ResolveContext {
            feature_id: layer_name,
            layer_name,
            attributes: &attributes,
            now: context.now,
        };
        let (properties, errors) = applicable.resolve_lenient(&ctx);
        issues.extend(errors.iter().map(|e| FeatureIssue::field_mapping(layer_name, e)));

        for issue in &issues {
            log::warn!("Layer {layer_name}: {}", issue.message);
        }

        (properties, issues)
    }
}

/// Resamples the rendered image onto a north-up longitude/latitude grid covering `bbox`, using nearest
/// neighbour. Pixels that fall outside of the raster are transparent.
fn warp(
    source: &RgbaImage,
    grid: &RasterGrid,
    adapter: &CoordinateAdapter,
    bbox: &GeoBox,
) -> Result<RgbaImage, ProjectionError> {
    let source_size = Size::new(source.width(), source.height());
    let to_pixel = grid
        .transform
        .rescaled(grid.size, source_size)
        .inverse()
        .ok_or(ProjectionError::DegenerateGrid)?;

    let longest = source_size.width().max(source_size.height()) as f64;
    let (width, height) = if bbox.width() >= bbox.height() {
        (longest, longest * bbox.height() / bbox.width())
    } else {
        (longest * bbox.width() / bbox.height(), longest)
    };
    let width = (width.round() as u32).max(1);
    let height = (height.round() as u32).max(1);

    let lon_step = bbox.width() / width as f64;
    let lat_step = bbox.height() / height as f64;

    let mut target = RgbaImage::from_pixel(width, height, TRANSPARENT);
    for y in 0..height {
        let lat = bbox.north - (y as f64 + 0.5) * lat_step;
        for x in 0..width {
            let lon = bbox.west + (x as f64 + 0.5) * lon_step;
            let Some(point) = adapter.from_geographic(&GeoPoint2d::latlon(lat, lon)) else {
                continue;
            };

            let pixel = to_pixel.apply(point.x, point.y);
            if pixel.x < 0.0 || pixel.y < 0.0 {
                continue;
            }

            let (col, row) = (pixel.x as u32, pixel.y as u32);
            if col < source.width() && row < source.height() {
                target.put_pixel(x, y, *source.get_pixel(col, row));
            }
        }
    }

    Ok(target)
}
