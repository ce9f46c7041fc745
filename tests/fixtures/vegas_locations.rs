//! Real Las Vegas locations for realistic fixtures.
//!
//! Coordinates sourced from OpenStreetMap. Strip addresses sit a few
//! hundred meters apart, which exercises both the 500m snap radius and
//! pixel clustering at city zoom levels.

use fleet_viz::geo::{GeoBounds, LatLng};
use fleet_viz::model::{Route, RouteStatus, RouteStop, StopPriority, StopStatus};

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn latlng(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Delivery addresses along the Strip, north to south.
pub const STRIP_STOPS: &[Location] = &[
    Location::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Location::new("The Venetian", 36.1211, -115.1697),
    Location::new("Caesars Palace", 36.1162, -115.1745),
    Location::new("Bellagio", 36.1126, -115.1767),
    Location::new("Park MGM", 36.1027, -115.1745),
    Location::new("MGM Grand", 36.1023654, -115.1688720),
];

/// A second service area out in Henderson.
pub const HENDERSON_STOPS: &[Location] = &[
    Location::new("Galleria at Sunset", 36.0614, -115.0398),
    Location::new("Sunset Station", 36.0629, -115.0351),
    Location::new("Fiesta Henderson", 36.0397, -115.0094),
];

/// Viewport covering the Strip but not Henderson.
pub fn strip_viewport() -> GeoBounds {
    GeoBounds::new(36.09, -115.19, 36.14, -115.15)
}

pub fn stop(id: &str, route_id: &str, seq: u32, at: &Location) -> RouteStop {
    RouteStop {
        id: id.to_string(),
        route_id: route_id.to_string(),
        sequence: seq,
        position: at.latlng(),
        status: StopStatus::Pending,
        priority: StopPriority::Normal,
        quantity: 1,
        eta_ms: Some(seq as i64 * 600_000),
        arrived_ms: None,
    }
}

pub fn route(id: &str, driver_id: &str, locations: &[Location]) -> Route {
    let stops = locations
        .iter()
        .enumerate()
        .map(|(i, loc)| stop(&format!("{}-s{}", id, i + 1), id, (i + 1) as u32, loc))
        .collect();
    Route {
        id: id.to_string(),
        driver_id: driver_id.to_string(),
        stops,
        status: RouteStatus::InProgress,
        path: None,
        total_distance_m: 0.0,
        total_duration_s: 0.0,
    }
}
