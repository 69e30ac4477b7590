//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error, PartialEq)]
pub enum TypesError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
    /// The string does not identify a coordinate system.
    #[error("invalid coordinate system identifier: {0:?}")]
    InvalidCrs(String),
}
