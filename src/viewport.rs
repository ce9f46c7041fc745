//! Visible-stop selection for the render layer.
//!
//! Filters the full route/stop set down to what should carry a marker:
//! stops inside the viewport plus a buffer band so panning does not pop
//! markers in at the edge, truncated deterministically when the count
//! exceeds the marker cap.

use tracing::debug;

use crate::geo::GeoBounds;
use crate::model::{Route, RouteStop};

#[derive(Debug, Clone)]
pub struct ViewportOptions {
    /// Bounds are expanded by this ratio before filtering.
    pub buffer_ratio: f64,
    /// Hard cap on rendered stop markers.
    pub max_markers: usize,
    /// Minimum interval between recomputations.
    pub debounce_ms: i64,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            buffer_ratio: 0.3,
            max_markers: 500,
            debounce_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleStops {
    pub visible: Vec<RouteStop>,
    /// Count before viewport filtering, for "showing X of Y" affordances.
    pub total: usize,
}

/// Computes the renderable stop subset for a viewport.
///
/// Rapid viewport-change events are debounced on the trailing edge: a call
/// inside `debounce_ms` of the last computation returns the cached result
/// and parks the requested bounds; the host polls past
/// [`ViewportStopProvider::next_deadline_ms`] to pick up the recompute for
/// the bounds the operator actually ended on.
#[derive(Debug)]
pub struct ViewportStopProvider {
    options: ViewportOptions,
    last_computed_ms: Option<i64>,
    pending_bounds: Option<GeoBounds>,
    cached: VisibleStops,
}

impl ViewportStopProvider {
    pub fn new(options: ViewportOptions) -> Self {
        Self {
            options,
            last_computed_ms: None,
            pending_bounds: None,
            cached: VisibleStops {
                visible: Vec::new(),
                total: 0,
            },
        }
    }

    /// Recomputes the visible subset, or returns the cached one while the
    /// debounce window is still open. A gated request is not dropped: its
    /// bounds stay pending until [`ViewportStopProvider::poll`] runs them.
    pub fn compute_visible(
        &mut self,
        routes: &[Route],
        map_bounds: GeoBounds,
        now_ms: i64,
    ) -> &VisibleStops {
        if let Some(last) = self.last_computed_ms {
            if now_ms - last < self.options.debounce_ms {
                self.pending_bounds = Some(map_bounds);
                return &self.cached;
            }
        }
        self.recompute(routes, map_bounds, now_ms)
    }

    /// Instant at which a parked viewport request becomes due, for host
    /// timer scheduling. None when nothing is pending.
    pub fn next_deadline_ms(&self) -> Option<i64> {
        self.pending_bounds?;
        self.last_computed_ms
            .map(|last| last + self.options.debounce_ms)
    }

    /// Runs a parked request once its debounce window has elapsed. Returns
    /// None when nothing is due yet.
    pub fn poll(&mut self, routes: &[Route], now_ms: i64) -> Option<&VisibleStops> {
        if now_ms < self.next_deadline_ms()? {
            return None;
        }
        let bounds = self.pending_bounds.take()?;
        Some(self.recompute(routes, bounds, now_ms))
    }

    /// Clears the debounce gate so the next call recomputes immediately.
    /// Used when the marker set itself changes (not just the viewport).
    pub fn invalidate(&mut self) {
        self.last_computed_ms = None;
    }

    fn recompute(&mut self, routes: &[Route], map_bounds: GeoBounds, now_ms: i64) -> &VisibleStops {
        self.pending_bounds = None;
        self.last_computed_ms = Some(now_ms);
        self.cached = select_visible(routes, map_bounds, &self.options);
        debug!(
            visible = self.cached.visible.len(),
            total = self.cached.total,
            "viewport stops recomputed"
        );
        &self.cached
    }
}

/// Pure selection: buffer-expanded bounds filter, then deterministic
/// priority truncation.
fn select_visible(routes: &[Route], map_bounds: GeoBounds, options: &ViewportOptions) -> VisibleStops {
    let expanded = map_bounds.expanded(options.buffer_ratio);
    let total = routes.iter().map(|r| r.stops.len()).sum();

    let mut in_bounds: Vec<RouteStop> = routes
        .iter()
        .flat_map(|r| r.stops.iter())
        .filter(|s| expanded.contains(s.position))
        .cloned()
        .collect();

    if in_bounds.len() > options.max_markers {
        // Urgent > high > normal; within a priority, earliest ETA first.
        // Stop id is the final key so equal-ETA orderings cannot flicker
        // between recomputations.
        in_bounds.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| {
                    a.eta_ms
                        .unwrap_or(i64::MAX)
                        .cmp(&b.eta_ms.unwrap_or(i64::MAX))
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        in_bounds.truncate(options.max_markers);
    }

    VisibleStops {
        visible: in_bounds,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use crate::model::{RouteStatus, StopPriority, StopStatus};

    fn stop(id: &str, lat: f64, lng: f64, priority: StopPriority, eta_ms: Option<i64>) -> RouteStop {
        RouteStop {
            id: id.to_string(),
            route_id: "r1".to_string(),
            sequence: 1,
            position: LatLng::new(lat, lng),
            status: StopStatus::Pending,
            priority,
            quantity: 1,
            eta_ms,
            arrived_ms: None,
        }
    }

    fn route(stops: Vec<RouteStop>) -> Route {
        Route {
            id: "r1".to_string(),
            driver_id: "d1".to_string(),
            stops,
            status: RouteStatus::InProgress,
            path: None,
            total_distance_m: 0.0,
            total_duration_s: 0.0,
        }
    }

    #[test]
    fn test_buffer_keeps_just_offscreen_stops() {
        let routes = vec![route(vec![
            stop("in", 36.15, -115.15, StopPriority::Normal, None),
            // Just north of the viewport but inside the 30% buffer.
            stop("buffered", 36.32, -115.15, StopPriority::Normal, None),
            // Far outside even the buffer.
            stop("out", 37.5, -115.15, StopPriority::Normal, None),
        ])];
        let bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let mut provider = ViewportStopProvider::new(ViewportOptions::default());
        let result = provider.compute_visible(&routes, bounds, 0);

        let ids: Vec<&str> = result.visible.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["in", "buffered"]);
        assert_eq!(result.total, 3);
    }

    #[test]
    fn test_debounce_returns_cached() {
        let bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let mut provider = ViewportStopProvider::new(ViewportOptions::default());

        let routes = vec![route(vec![stop("a", 36.1, -115.1, StopPriority::Normal, None)])];
        let first = provider.compute_visible(&routes, bounds, 1000).clone();

        // New stop arrives 50ms later; still inside the debounce window.
        let routes2 = vec![route(vec![
            stop("a", 36.1, -115.1, StopPriority::Normal, None),
            stop("b", 36.2, -115.2, StopPriority::Normal, None),
        ])];
        let second = provider.compute_visible(&routes2, bounds, 1050).clone();
        assert_eq!(first, second);

        // Past the window it recomputes.
        let third = provider.compute_visible(&routes2, bounds, 1200);
        assert_eq!(third.visible.len(), 2);
    }

    #[test]
    fn test_trailing_viewport_event_recomputed_on_poll() {
        // Pan ends inside the debounce window: the last bounds must not be
        // lost, or the display stays stale for the viewport the operator
        // is actually looking at.
        let strip_bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let henderson_bounds = GeoBounds::new(35.95, -115.10, 36.10, -114.90);
        let routes = vec![route(vec![
            stop("strip", 36.15, -115.2, StopPriority::Normal, None),
            stop("henderson", 36.05, -115.0, StopPriority::Normal, None),
        ])];

        let mut provider = ViewportStopProvider::new(ViewportOptions::default());
        let first = provider.compute_visible(&routes, strip_bounds, 0);
        assert!(first.visible.iter().any(|s| s.id == "strip"));

        // The final pan event lands 50ms later; the cached subset is
        // served but the new bounds are parked with a deadline.
        let gated = provider.compute_visible(&routes, henderson_bounds, 50);
        assert!(gated.visible.iter().any(|s| s.id == "strip"));
        assert_eq!(provider.next_deadline_ms(), Some(150));

        // Not due yet.
        assert!(provider.poll(&routes, 100).is_none());

        // Past the window the parked bounds are computed.
        let settled = provider.poll(&routes, 150).unwrap();
        let ids: Vec<&str> = settled.visible.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["henderson"]);
        assert_eq!(provider.next_deadline_ms(), None);
        assert!(provider.poll(&routes, 500).is_none());
    }

    #[test]
    fn test_invalidate_bypasses_debounce() {
        let bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let mut provider = ViewportStopProvider::new(ViewportOptions::default());
        provider.compute_visible(&[], bounds, 1000);

        let routes = vec![route(vec![stop("a", 36.1, -115.1, StopPriority::Normal, None)])];
        provider.invalidate();
        let result = provider.compute_visible(&routes, bounds, 1010);
        assert_eq!(result.visible.len(), 1);
    }

    #[test]
    fn test_truncation_prefers_urgent() {
        let mut stops = Vec::new();
        for i in 0..8 {
            stops.push(stop(
                &format!("n{}", i),
                36.1,
                -115.1,
                StopPriority::Normal,
                Some(i),
            ));
        }
        stops.push(stop("u1", 36.2, -115.2, StopPriority::Urgent, Some(900)));
        stops.push(stop("h1", 36.2, -115.3, StopPriority::High, Some(900)));

        let options = ViewportOptions {
            max_markers: 4,
            ..ViewportOptions::default()
        };
        let mut provider = ViewportStopProvider::new(options);
        let bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let result = provider.compute_visible(&[route(stops)], bounds, 0);

        let ids: Vec<&str> = result.visible.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "h1", "n0", "n1"]);
    }

    #[test]
    fn test_truncation_stable_across_recomputes() {
        let mut stops = Vec::new();
        for i in 0..20 {
            // All same priority and ETA: ordering must still be stable.
            stops.push(stop(&format!("s{:02}", i), 36.1, -115.1, StopPriority::Normal, Some(5)));
        }
        let options = ViewportOptions {
            max_markers: 10,
            debounce_ms: 0,
            ..ViewportOptions::default()
        };
        let mut provider = ViewportStopProvider::new(options);
        let bounds = GeoBounds::new(36.0, -115.4, 36.3, -115.0);
        let routes = vec![route(stops)];

        let first = provider.compute_visible(&routes, bounds, 0).clone();
        let second = provider.compute_visible(&routes, bounds, 1000).clone();
        assert_eq!(first, second);
    }
}
