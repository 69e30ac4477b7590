use std::any::Any;

use export2kml_types::cartesian::Size;
use export2kml_types::geo::Crs;
use serde::{Deserialize, Serialize};

use super::{RasterRenderer, RenderedRaster};
use crate::color::Color;
use crate::error::RenderError;
use crate::layer::{RasterGrid, RasterLayer};

/// How values between color stops are colored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    /// Colors are interpolated linearly between the stops.
    #[default]
    Interpolate,
    /// A value gets the color of the first stop that is not less than the value.
    Discrete,
    /// Only values equal to a stop value are colored.
    Exact,
}

/// Color assigned to a raster value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Raster value.
    pub value: f64,
    /// Color of the value.
    pub color: Color,
}

/// Pseudocolor ramp for single band rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
    #[serde(default)]
    mode: RampMode,
    /// Values outside of the stop range are not rendered, instead of getting the color of the nearest stop.
    #[serde(default)]
    clip: bool,
}

impl ColorRamp {
    /// Creates a ramp. Stops are sorted by value.
    pub fn new(mut stops: Vec<ColorStop>, mode: RampMode) -> Self {
        stops.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self {
            stops,
            mode,
            clip: false,
        }
    }

    /// Linear ramp between two colors.
    pub fn linear(min: f64, min_color: Color, max: f64, max_color: Color) -> Self {
        Self::new(
            vec![
                ColorStop {
                    value: min,
                    color: min_color,
                },
                ColorStop {
                    value: max,
                    color: max_color,
                },
            ],
            RampMode::Interpolate,
        )
    }

    /// Sets whether values outside of the stop range are rendered.
    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    /// Color stops.
    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Color of the value, or `None` if the value is outside of the style.
    pub fn color_for(&self, value: f64) -> Option<Color> {
        let first = self.stops.first()?;
        let last = self.stops.last()?;

        match self.mode {
            RampMode::Exact => self.stops.iter().find(|s| s.value == value).map(|s| s.color),
            RampMode::Discrete => match self.stops.iter().find(|s| value <= s.value) {
                Some(stop) if !self.clip || value >= first.value => Some(stop.color),
                Some(_) => None,
                None if self.clip => None,
                None => Some(last.color),
            },
            RampMode::Interpolate => {
                if value < first.value || value > last.value {
                    if self.clip {
                        return None;
                    }
                    return Some(if value < first.value {
                        first.color
                    } else {
                        last.color
                    });
                }

                let upper_index = self
                    .stops
                    .iter()
                    .position(|s| s.value >= value)
                    .unwrap_or(self.stops.len() - 1);
                if upper_index == 0 {
                    return Some(first.color);
                }

                let lower = &self.stops[upper_index - 1];
                let upper = &self.stops[upper_index];
                let span = upper.value - lower.value;
                let t = if span > 0.0 {
                    (value - lower.value) / span
                } else {
                    1.0
                };

                Some(lower.color.lerp(upper.color, t))
            }
        }
    }
}

/// Style of a [`GridRaster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterStyle {
    /// Color ramp.
    pub ramp: ColorRamp,
    /// Opacity of the whole layer, from 0 to 1.
    #[serde(default = "full_opacity")]
    pub opacity: f32,
}

fn full_opacity() -> f32 {
    1.0
}

impl RasterStyle {
    /// Style with the given ramp and full opacity.
    pub fn new(ramp: ColorRamp) -> Self {
        Self { ramp, opacity: 1.0 }
    }

    /// Sets opacity.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Single band raster held in memory.
#[derive(Debug, Clone)]
pub struct GridRaster {
    name: String,
    crs: Crs,
    grid: RasterGrid,
    values: Vec<f64>,
    nodata: Option<f64>,
    style: RasterStyle,
}

impl GridRaster {
    /// Creates a raster. `values` are stored row by row and must have one value per grid cell.
    pub fn new(
        name: impl Into<String>,
        crs: Crs,
        grid: RasterGrid,
        values: Vec<f64>,
        style: RasterStyle,
    ) -> Result<Self, RenderError> {
        if values.len() != grid.size.area() {
            return Err(RenderError::BufferSize {
                expected: grid.size.area(),
                actual: values.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            crs,
            grid,
            values,
            nodata: None,
            style,
        })
    }

    /// Sets the value marking cells without data.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Style of the raster.
    pub fn style(&self) -> &RasterStyle {
        &self.style
    }

    /// Value of the cell, or `None` if the cell has no data.
    pub fn value(&self, col: u32, row: u32) -> Option<f64> {
        let index = row as usize * self.grid.size.width() as usize + col as usize;
        let value = *self.values.get(index)?;
        if value.is_nan() || self.nodata == Some(value) {
            None
        } else {
            Some(value)
        }
    }
}

impl RasterLayer for GridRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn grid(&self) -> RasterGrid {
        self.grid
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Renders [`GridRaster`] layers with their color ramps.
///
/// Images of a different size than the grid are sampled with nearest neighbour.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyledGridRenderer;

impl RasterRenderer for StyledGridRenderer {
    fn render(&self, layer: &dyn RasterLayer, size: Size<u32>) -> Result<RenderedRaster, RenderError> {
        let Some(raster) = layer.as_any().downcast_ref::<GridRaster>() else {
            return Err(RenderError::UnsupportedLayer(layer.name().to_string()));
        };

        let grid_size = raster.grid.size;
        if size.is_zero() || grid_size.is_zero() {
            return Err(RenderError::Style(format!("cannot render raster {} into an empty image", raster.name)));
        }

        let style = &raster.style;
        let mut pixels = Vec::with_capacity(size.area() * 4);
        let mut valid = Vec::with_capacity(size.area());
        let sx = grid_size.width() as f64 / size.width() as f64;
        let sy = grid_size.height() as f64 / size.height() as f64;

        for y in 0..size.height() {
            let row = (((y as f64 + 0.5) * sy) as u32).min(grid_size.height() - 1);
            for x in 0..size.width() {
                let col = (((x as f64 + 0.5) * sx) as u32).min(grid_size.width() - 1);
                let color = raster
                    .value(col, row)
                    .and_then(|v| style.ramp.color_for(v))
                    .map(|c| c.fade(style.opacity));

                match color {
                    Some(color) => {
                        pixels.extend_from_slice(&color.to_u8_array());
                        valid.push(true);
                    }
                    None => {
                        pixels.extend_from_slice(&[0, 0, 0, 0]);
                        valid.push(false);
                    }
                }
            }
        }

        log::debug!(
            "Rendered raster {} ({}x{}) into {}x{} image",
            raster.name,
            grid_size.width(),
            grid_size.height(),
            size.width(),
            size.height()
        );

        Ok(RenderedRaster {
            size,
            pixels,
            valid: Some(valid),
        })
    }
}
