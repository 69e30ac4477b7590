//! Implementations for the projections a source layer may use.

mod identity;
mod web_mercator;

pub use identity::IdentityProjection;
pub use web_mercator::WebMercator;

#[cfg(feature = "geodesy")]
mod geodesy;
#[cfg(feature = "geodesy")]
pub use geodesy::GeodesyProjection;

/// Projection converts points from one coordinate space into another.
///
/// `project` goes from `InPoint` to `OutPoint` and `unproject` does the reverse. Both return `None` if the point
/// cannot be converted (e.g. it is outside of the projection domain).
pub trait Projection {
    /// Type of the input point.
    type InPoint;
    /// Type of the output point.
    type OutPoint;

    /// Projects the point.
    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint>;
    /// Projects the point back.
    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint>;
}

/// Projection that swaps the directions of the inner one.
///
/// Coordinate systems are described by projections from geographic to projected coordinates, while exporting
/// needs the opposite direction. Wrapping such a projection into `InvertedProjection` allows it to be given to
/// [`Geometry::project`](crate::Geometry::project).
pub struct InvertedProjection<P: ?Sized> {
    inner: Box<P>,
}

impl<P: ?Sized> InvertedProjection<P> {
    /// Creates a new instance.
    pub fn new(inner: Box<P>) -> Self {
        Self { inner }
    }
}

impl<P: Projection + ?Sized> Projection for InvertedProjection<P> {
    type InPoint = P::OutPoint;
    type OutPoint = P::InPoint;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        self.inner.unproject(input)
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        self.inner.project(input)
    }
}
