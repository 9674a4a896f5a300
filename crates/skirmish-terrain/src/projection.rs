//! Geographic projection: converts between lat/lng and local metric coordinates.
//!
//! Uses equirectangular projection centered on the sector reference point.
//! Accurate to <0.1% within 400km of the reference point.

use glam::DVec2;

use skirmish_core::types::LatLng;

/// Meters per degree of latitude (nearly constant across the globe).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Geographic projection anchored at a sector center point.
///
/// The reference point maps to local origin (0, 0); x = East, y = North.
#[derive(Debug, Clone)]
pub struct GeoProjection {
    reference: LatLng,
    /// Cached cos(ref lat) for longitude scaling.
    cos_ref_lat: f64,
}

impl GeoProjection {
    pub fn new(reference: LatLng) -> Self {
        Self {
            reference,
            cos_ref_lat: reference.lat.to_radians().cos(),
        }
    }

    /// Convert lat/lng to local meters.
    pub fn to_local(&self, p: &LatLng) -> DVec2 {
        DVec2::new(
            (p.lng - self.reference.lng) * METERS_PER_DEGREE * self.cos_ref_lat,
            (p.lat - self.reference.lat) * METERS_PER_DEGREE,
        )
    }

    /// Convert local meters back to lat/lng.
    pub fn to_geo(&self, v: DVec2) -> LatLng {
        LatLng::new(
            self.reference.lat + v.y / METERS_PER_DEGREE,
            self.reference.lng + v.x / (METERS_PER_DEGREE * self.cos_ref_lat),
        )
    }

    /// Straight-line ground distance in meters.
    pub fn distance_m(&self, a: &LatLng, b: &LatLng) -> f64 {
        self.to_local(a).distance(self.to_local(b))
    }

    pub fn reference(&self) -> LatLng {
        self.reference
    }
}
