//! Rendering of raster layers into RGBA images.
//!
//! The exporter does not know how the host styles its rasters. Instead, a [`RasterRenderer`] is given to the job,
//! which produces an image of the requested size for a layer. [`StyledGridRenderer`] renders in-memory
//! [`GridRaster`] layers with a color ramp and is used when no other renderer is set.

use export2kml_types::cartesian::Size;

use crate::error::RenderError;
use crate::layer::RasterLayer;

mod grid;

pub use grid::{ColorRamp, ColorStop, GridRaster, RampMode, RasterStyle, StyledGridRenderer};

/// Image produced by a [`RasterRenderer`].
///
/// Pixels are stored row by row, top row first, 4 bytes (RGBA) per pixel. Pixel `(0, 0)` corresponds to the
/// grid cell at the origin of the layer's geotransform.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRaster {
    /// Size of the image.
    pub size: Size<u32>,
    /// RGBA pixel data.
    pub pixels: Vec<u8>,
    /// Validity of every pixel. Pixels marked `false` are nodata or outside of the style and are made fully
    /// transparent in the overlay. If not set, every pixel is valid.
    pub valid: Option<Vec<bool>>,
}

impl RenderedRaster {
    /// Checks that the buffers match the image size.
    pub fn validate(&self) -> Result<(), RenderError> {
        let expected = self.size.area() * 4;
        if self.pixels.len() != expected {
            return Err(RenderError::BufferSize {
                expected,
                actual: self.pixels.len(),
            });
        }

        if let Some(valid) = &self.valid {
            if valid.len() != self.size.area() {
                return Err(RenderError::BufferSize {
                    expected: self.size.area(),
                    actual: valid.len(),
                });
            }
        }

        Ok(())
    }

    /// Converts into an image, making invalid pixels transparent.
    pub fn into_image(self) -> Result<image::RgbaImage, RenderError> {
        self.validate()?;
        let RenderedRaster {
            size,
            mut pixels,
            valid,
        } = self;

        if let Some(valid) = valid {
            for (pixel, valid) in pixels.chunks_exact_mut(4).zip(valid) {
                if !valid {
                    pixel.copy_from_slice(&[0, 0, 0, 0]);
                }
            }
        }

        let expected = pixels.len();
        image::RgbaImage::from_raw(size.width(), size.height(), pixels).ok_or(RenderError::BufferSize {
            expected,
            actual: expected,
        })
    }
}

/// Renders raster layers with their styles applied.
pub trait RasterRenderer {
    /// Renders the whole layer into an image of the given size.
    fn render(&self, layer: &dyn RasterLayer, size: Size<u32>) -> Result<RenderedRaster, RenderError>;
}
