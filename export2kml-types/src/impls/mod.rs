//! Simple geometry types.

mod contour;
mod multi_contour;
mod multi_point;
mod multi_polygon;
mod polygon;

pub use contour::{ClosedContour, Contour};
pub use multi_contour::MultiContour;
pub use multi_point::MultiPoint;
pub use multi_polygon::MultiPolygon;
pub use polygon::Polygon;
