use export2kml_types::cartesian::{Point2d, Rect, Size};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Affine transformation from pixel (column, row) coordinates of a raster grid into the coordinates of the
/// raster's CRS.
///
/// Coefficients are stored in the usual GDAL order:
/// `x = c[0] + col * c[1] + row * c[2]` and `y = c[3] + col * c[4] + row * c[5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a transform from the six GDAL coefficients.
    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// Transform of a north-up grid with the top left corner at `(origin_x, origin_y)` and the given pixel size.
    /// Rows go down (to the south), so `pixel_height` is given as a positive number.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height])
    }

    /// GDAL coefficients of the transform.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Converts pixel coordinates into CRS coordinates.
    pub fn apply(&self, col: f64, row: f64) -> Point2d {
        let c = &self.0;
        Point2d::new(
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Returns true if the grid axes are not aligned with the CRS axes.
    pub fn is_rotated(&self) -> bool {
        self.0[2] != 0.0 || self.0[4] != 0.0
    }

    /// Angle between the CRS x axis and the grid rows, in degrees counter-clockwise.
    pub fn rotation(&self) -> f64 {
        if !self.is_rotated() {
            return 0.0;
        }

        self.0[4].atan2(self.0[1]).to_degrees()
    }

    /// Length of a pixel side along columns and rows in CRS units.
    pub fn pixel_size(&self) -> (f64, f64) {
        let c = &self.0;
        (c[1].hypot(c[4]), c[2].hypot(c[5]))
    }

    /// Transform as a homogeneous 3x3 matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let c = &self.0;
        Matrix3::new(c[1], c[2], c[0], c[4], c[5], c[3], 0.0, 0.0, 1.0)
    }

    /// Transform from CRS coordinates into pixel coordinates. Returns `None` if the transform is degenerate.
    pub fn inverse(&self) -> Option<Self> {
        let m = self.to_matrix().try_inverse()?;
        let coefficients = [m[(0, 2)], m[(0, 0)], m[(0, 1)], m[(1, 2)], m[(1, 0)], m[(1, 1)]];
        if coefficients.iter().all(|v| v.is_finite()) {
            Some(Self(coefficients))
        } else {
            None
        }
    }

    /// Returns a transform for the same area covered with a grid of `to` size instead of `from` size.
    pub fn rescaled(&self, from: Size<u32>, to: Size<u32>) -> Self {
        let sx = from.width() as f64 / to.width().max(1) as f64;
        let sy = from.height() as f64 / to.height().max(1) as f64;
        let c = &self.0;
        Self([c[0], c[1] * sx, c[2] * sy, c[3], c[4] * sx, c[5] * sy])
    }
}

/// Size and georeferencing of a raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    /// Number of columns and rows.
    pub size: Size<u32>,
    /// Pixel to CRS transformation.
    pub transform: GeoTransform,
}

impl RasterGrid {
    /// Creates a new grid.
    pub fn new(size: Size<u32>, transform: GeoTransform) -> Self {
        Self { size, transform }
    }

    /// Returns true if the grid covers no area.
    pub fn is_degenerate(&self) -> bool {
        self.size.is_zero() || self.transform.inverse().is_none()
    }

    /// Corners of the grid in CRS coordinates, clockwise starting from the top left one.
    pub fn corners(&self) -> [Point2d; 4] {
        let w = self.size.width() as f64;
        let h = self.size.height() as f64;
        [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(w, h),
            self.transform.apply(0.0, h),
        ]
    }

    /// Bounding rectangle of the grid in CRS coordinates.
    pub fn envelope(&self) -> Option<Rect> {
        if self.size.is_zero() {
            return None;
        }

        Rect::from_points(self.corners().iter())
    }
}
