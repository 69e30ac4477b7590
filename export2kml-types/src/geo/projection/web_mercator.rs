use crate::cartesian::NewCartesianPoint2d;
use crate::geo::{Datum, NewGeoPoint, Projection};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::marker::PhantomData;

/// Spherical Web Mercator projection (EPSG:3857).
#[derive(Debug, Copy, Clone)]
pub struct WebMercator<In, Out> {
    datum: Datum,
    phantom_in: PhantomData<In>,
    phantom_out: PhantomData<Out>,
}

impl<In, Out> WebMercator<In, Out> {
    /// Creates a new projection using the semimajor axis of the given datum as the sphere radius.
    pub fn new(datum: Datum) -> Self {
        Self {
            datum,
            phantom_in: Default::default(),
            phantom_out: Default::default(),
        }
    }
}

impl<In, Out> Default for WebMercator<In, Out> {
    fn default() -> Self {
        Self::new(Datum::WGS84)
    }
}

impl<In: NewGeoPoint<f64>, Out: NewCartesianPoint2d<f64>> Projection for WebMercator<In, Out> {
    type InPoint = In;
    type OutPoint = Out;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        let x = self.datum.semimajor() * input.lon_rad();
        let y = self.datum.semimajor() * (FRAC_PI_4 + input.lat_rad() / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(Self::OutPoint::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        let lat = 2.0 * (input.y() / self.datum.semimajor()).exp().atan() - FRAC_PI_2;
        let lon = input.x() / self.datum.semimajor();

        if lat.is_finite() && lon.is_finite() {
            Some(Self::InPoint::latlon(lat.to_degrees(), lon.to_degrees()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartesian::Point2d;
    use crate::geo::{GeoPoint, GeoPoint2d};
    use crate::latlon;
    use approx::assert_abs_diff_eq;

    #[test]
    fn project_and_back() {
        let projection = WebMercator::<GeoPoint2d, Point2d>::default();
        let point = latlon!(55.75, 37.61);
        let projected = projection.project(&point).unwrap();
        assert_abs_diff_eq!(projected.x, 4_186_726.05, epsilon = 0.01);

        let unprojected = projection.unproject(&projected).unwrap();
        assert_abs_diff_eq!(unprojected.lat(), 55.75, epsilon = 1e-9);
        assert_abs_diff_eq!(unprojected.lon(), 37.61, epsilon = 1e-9);
    }

    #[test]
    fn origin_is_null_island() {
        let projection = WebMercator::<GeoPoint2d, Point2d>::default();
        let point = projection.unproject(&Point2d::new(0.0, 0.0)).unwrap();
        assert_abs_diff_eq!(point, latlon!(0.0, 0.0), epsilon = 1e-12);
    }
}
