use crate::cartesian::NewCartesianPoint2d;
use crate::geo::{NewGeoPoint, Projection};
use std::marker::PhantomData;

/// Projection of geographic coordinates onto a plane without any transformation: longitude becomes `x` and
/// latitude becomes `y`, both in degrees.
///
/// This is how layers stored in a geographic coordinate system give their coordinates.
#[derive(Debug)]
pub struct IdentityProjection<In, Out> {
    phantom_in: PhantomData<In>,
    phantom_out: PhantomData<Out>,
}

impl<In, Out> IdentityProjection<In, Out> {
    /// Creates a new instance.
    pub fn new() -> Self {
        Self {
            phantom_in: Default::default(),
            phantom_out: Default::default(),
        }
    }
}

impl<In, Out> Default for IdentityProjection<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: NewGeoPoint<f64>, Out: NewCartesianPoint2d<f64>> Projection for IdentityProjection<In, Out> {
    type InPoint = In;
    type OutPoint = Out;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        Some(Out::new(input.lon(), input.lat()))
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        if !input.x().is_finite() || !input.y().is_finite() || input.y().abs() > 90.0 {
            return None;
        }

        Some(In::latlon(input.y(), input.x()))
    }
}
