//! Geometry, coordinate system and projection types used by `export2kml`.
//!
//! Source layers hand their features over as cartesian geometries ([`cartesian::Point2d`] based) in the
//! layer's own coordinate system ([`geo::Crs`]). The exporter needs them in longitude/latitude, so every
//! geometry in [`impls`] can be projected with any [`geo::Projection`] through the [`Geometry`] trait.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod cartesian;
pub mod error;
pub mod geo;
mod geometry;
pub mod impls;

#[cfg(feature = "geo-types")]
mod geo_types;

pub use geometry::{Geom, Geometry};
