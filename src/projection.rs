//! Screen-space projection seam over the external map provider.
//!
//! Clustering works in pixels so cluster radii stay stable across zoom
//! levels. The map provider may not have a projection ready while tiles are
//! still initializing; in that state pixel distances degrade to infinity so
//! dependent algorithms see "no match" instead of an error.

use crate::geo::{GeoBounds, LatLng};

/// Screen-space point in pixels at some zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// The slice of the external map provider this crate depends on.
///
/// Concrete apps implement this over their map widget; tests use
/// [`WebMercator`].
pub trait ProjectionProvider {
    /// Project a coordinate to pixel space at the given zoom, or None while
    /// the provider's projection is not yet available.
    fn project(&self, point: LatLng, zoom: f64) -> Option<PixelPoint>;

    /// The geographic bounds currently visible.
    fn viewport_bounds(&self) -> Option<GeoBounds>;
}

/// Distance between two coordinates in on-screen pixels at `zoom`.
///
/// Returns infinity when the projection is unavailable, so callers degrade
/// to "no match" rather than failing.
pub fn pixel_distance<P: ProjectionProvider>(
    provider: &P,
    a: LatLng,
    b: LatLng,
    zoom: f64,
) -> f64 {
    match (provider.project(a, zoom), provider.project(b, zoom)) {
        (Some(pa), Some(pb)) => ((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt(),
        _ => f64::INFINITY,
    }
}

/// Reference Web-Mercator projection (256px world tile at zoom 0).
///
/// Headless stand-in for a real map widget; also what the integration tests
/// drive the cluster engine with.
#[derive(Debug, Clone)]
pub struct WebMercator {
    viewport: Option<GeoBounds>,
    /// When false, `project` returns None, mimicking a map that has not
    /// finished initializing.
    ready: bool,
}

const TILE_SIZE: f64 = 256.0;

impl WebMercator {
    pub fn new(viewport: GeoBounds) -> Self {
        Self {
            viewport: Some(viewport),
            ready: true,
        }
    }

    /// A provider whose projection is not yet available.
    pub fn uninitialized() -> Self {
        Self {
            viewport: None,
            ready: false,
        }
    }

    pub fn set_viewport(&mut self, viewport: GeoBounds) {
        self.viewport = Some(viewport);
        self.ready = true;
    }
}

impl ProjectionProvider for WebMercator {
    fn project(&self, point: LatLng, zoom: f64) -> Option<PixelPoint> {
        if !self.ready {
            return None;
        }
        let scale = TILE_SIZE * 2f64.powf(zoom);
        let x = (point.lng + 180.0) / 360.0 * scale;
        let sin_lat = point.lat.to_radians().sin().clamp(-0.9999, 0.9999);
        let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * std::f64::consts::PI))
            * scale;
        Some(PixelPoint { x, y })
    }

    fn viewport_bounds(&self) -> Option<GeoBounds> {
        self.viewport
    }
}
