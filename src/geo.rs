//! Great-circle distance, bearing, and geographic bounds.
//!
//! All real-world costs (detour distance, snap distance) are computed on the
//! sphere; screen-space math lives in `projection` and the two are never
//! mixed in one formula.

use serde::{Deserialize, Serialize};

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_m(from: LatLng, to: LatLng) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Initial bearing from one point to another, in degrees [0, 360).
pub fn bearing_deg(from: LatLng, to: LatLng) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// An axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Smallest bounds containing all points. Returns None for an empty set.
    pub fn containing(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self::new(first.lat, first.lng, first.lat, first.lng);
        for point in &points[1..] {
            bounds.extend(*point);
        }
        Some(bounds)
    }

    /// Grow the bounds to include a point.
    pub fn extend(&mut self, point: LatLng) {
        self.south = self.south.min(point.lat);
        self.north = self.north.max(point.lat);
        self.west = self.west.min(point.lng);
        self.east = self.east.max(point.lng);
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    /// Center of the box.
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Expand symmetrically by a ratio of each span (0.3 grows each side by
    /// 15% of the span).
    pub fn expanded(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south) * ratio / 2.0;
        let lng_pad = (self.east - self.west) * ratio / 2.0;
        Self {
            south: self.south - lat_pad,
            west: self.west - lng_pad,
            north: self.north + lat_pad,
            east: self.east + lng_pad,
        }
    }
}
