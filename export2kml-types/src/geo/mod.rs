//! Geometries in geographic coordinates (latitude and longitude) (see [`GeoPoint`]), coordinate reference systems
//! (see [`Crs`]) and conversion between them (see [`Projection`]).

mod crs;
mod datum;
mod point;
pub mod projection;

pub use crs::{Crs, ProjectionType};
pub use datum::Datum;
pub use point::{GeoPoint, GeoPoint2d, NewGeoPoint};
pub use projection::{InvertedProjection, Projection};
