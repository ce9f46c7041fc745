//! Cheapest-insertion placement for a dragged stop.
//!
//! Given the drop position and the candidate routes, finds the route and
//! slot that add the least detour distance. Distances are great-circle
//! meters; flat-plane shortcuts bias the result at high latitudes. The
//! output is a proposal only, never a direct mutation.

use crate::geo::{haversine_m, LatLng};
use crate::model::Route;

/// Maximum distance from the drop point to a route's nearest stop for that
/// route to be considered, in meters.
pub const DEFAULT_SNAP_DISTANCE_M: f64 = 500.0;

#[derive(Debug, Clone)]
pub struct InsertionOptions {
    pub snap_distance_m: f64,
}

impl Default for InsertionOptions {
    fn default() -> Self {
        Self {
            snap_distance_m: DEFAULT_SNAP_DISTANCE_M,
        }
    }
}

/// A computed placement: insert before the stop currently at
/// `insertion_index` (0-based, `stops.len()` appends).
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionPoint {
    pub route_id: String,
    pub insertion_index: usize,
    pub detour_cost_m: f64,
}

/// Detour cost of inserting `point` at position `i` of `stops`.
///
/// With both neighbors present this is the classic insertion delta
/// `d(pred, p) + d(p, succ) - d(pred, succ)`; at either end only the single
/// new leg counts, and an empty route costs nothing.
pub fn detour_cost_m(stops: &[LatLng], point: LatLng, i: usize) -> f64 {
    let pred = (i > 0).then(|| stops[i - 1]);
    let succ = (i < stops.len()).then(|| stops[i]);
    match (pred, succ) {
        (Some(p), Some(s)) => haversine_m(p, point) + haversine_m(point, s) - haversine_m(p, s),
        (Some(p), None) => haversine_m(p, point),
        (None, Some(s)) => haversine_m(point, s),
        (None, None) => 0.0,
    }
}

/// Cheapest insertion slot within one route. Ties break to the lowest index.
pub fn best_slot(stops: &[LatLng], point: LatLng) -> (usize, f64) {
    let mut best_index = 0;
    let mut best_cost = f64::INFINITY;
    for i in 0..=stops.len() {
        let cost = detour_cost_m(stops, point, i);
        if cost < best_cost {
            best_cost = cost;
            best_index = i;
        }
    }
    (best_index, best_cost)
}

/// Picks the candidate route and slot for a dropped stop.
///
/// If the drag is hovering a highlighted route, that route is used
/// directly. Otherwise the route owning the geographically nearest stop
/// wins, provided that stop lies within the snap distance; with no route in
/// range the drop does not match and the caller leaves the stop where it
/// was. The stop being dragged is excluded from nearest-stop and slot math
/// when it already belongs to the candidate route.
pub fn find_insertion_point(
    drop_position: LatLng,
    routes: &[Route],
    hovered_route_id: Option<&str>,
    dragged_stop_id: &str,
    options: &InsertionOptions,
) -> Option<InsertionPoint> {
    let candidate = match hovered_route_id {
        Some(id) => routes.iter().find(|r| r.id == id)?,
        None => nearest_route(drop_position, routes, dragged_stop_id, options)?,
    };

    let positions: Vec<LatLng> = candidate
        .stops
        .iter()
        .filter(|s| s.id != dragged_stop_id)
        .map(|s| s.position)
        .collect();

    let (insertion_index, detour_cost) = best_slot(&positions, drop_position);
    Some(InsertionPoint {
        route_id: candidate.id.clone(),
        insertion_index,
        detour_cost_m: detour_cost,
    })
}

fn nearest_route<'a>(
    drop_position: LatLng,
    routes: &'a [Route],
    dragged_stop_id: &str,
    options: &InsertionOptions,
) -> Option<&'a Route> {
    let mut best: Option<(&Route, f64)> = None;
    for route in routes {
        for stop in &route.stops {
            if stop.id == dragged_stop_id {
                continue;
            }
            let d = haversine_m(drop_position, stop.position);
            if d <= options.snap_distance_m && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((route, d));
            }
        }
    }
    best.map(|(route, _)| route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RouteStatus, RouteStop, StopPriority, StopStatus};

    fn stop(id: &str, route_id: &str, seq: u32, lat: f64, lng: f64) -> RouteStop {
        RouteStop {
            id: id.to_string(),
            route_id: route_id.to_string(),
            sequence: seq,
            position: LatLng::new(lat, lng),
            status: StopStatus::Pending,
            priority: StopPriority::Normal,
            quantity: 1,
            eta_ms: None,
            arrived_ms: None,
        }
    }

    fn route(id: &str, stops: Vec<RouteStop>) -> Route {
        Route {
            id: id.to_string(),
            driver_id: format!("driver-{}", id),
            stops,
            status: RouteStatus::InProgress,
            path: None,
            total_distance_m: 0.0,
            total_duration_s: 0.0,
        }
    }

    #[test]
    fn test_midpoint_goes_between() {
        // Stops A and C roughly 1.1km apart along a street; drop near the
        // midpoint.
        let a = LatLng::new(36.1000, -115.1000);
        let c = LatLng::new(36.1100, -115.1000);
        let mid = LatLng::new(36.1050, -115.1002);

        let stops = vec![a, c];
        let (index, cost) = best_slot(&stops, mid);
        assert_eq!(index, 1);
        assert!(cost <= detour_cost_m(&stops, mid, 0));
        assert!(cost <= detour_cost_m(&stops, mid, 2));
    }

    #[test]
    fn test_empty_route_inserts_at_zero() {
        let (index, cost) = best_slot(&[], LatLng::new(36.1, -115.1));
        assert_eq!(index, 0);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_single_stop_ends() {
        let only = LatLng::new(36.10, -115.10);
        // Drop north of the only stop: either end costs one leg; the tie
        // breaks to index 0.
        let stops = vec![only];
        let point = LatLng::new(36.11, -115.10);
        let (index, _) = best_slot(&stops, point);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_tie_breaks_low_index() {
        // Drop exactly on an existing stop: inserting before or after it
        // costs the same; the lower index wins.
        let a = LatLng::new(36.10, -115.10);
        let b = LatLng::new(36.12, -115.10);
        let (index, _) = best_slot(&[a, b], a);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_snap_distance_rejects_far_drop() {
        let routes = vec![route("r1", vec![stop("s1", "r1", 1, 36.10, -115.10)])];
        // ~11km away, far outside the 500m snap radius.
        let drop = LatLng::new(36.20, -115.10);
        let result = find_insertion_point(drop, &routes, None, "dragged", &InsertionOptions::default());
        assert!(result.is_none());
    }

    #[test]
    fn test_hovered_route_overrides_nearest() {
        let routes = vec![
            route("near", vec![stop("n1", "near", 1, 36.1000, -115.1000)]),
            route("hovered", vec![stop("h1", "hovered", 1, 36.1500, -115.1500)]),
        ];
        // Drop right next to route "near" but while hovering "hovered".
        let drop = LatLng::new(36.1001, -115.1001);
        let result =
            find_insertion_point(drop, &routes, Some("hovered"), "dragged", &InsertionOptions::default())
                .unwrap();
        assert_eq!(result.route_id, "hovered");
    }

    #[test]
    fn test_nearest_route_selected() {
        let routes = vec![
            route("r1", vec![stop("s1", "r1", 1, 36.1000, -115.1000)]),
            route("r2", vec![stop("s2", "r2", 1, 36.1030, -115.1000)]),
        ];
        // ~100m from s2, ~230m from s1.
        let drop = LatLng::new(36.1021, -115.1000);
        let result = find_insertion_point(drop, &routes, None, "dragged", &InsertionOptions::default())
            .unwrap();
        assert_eq!(result.route_id, "r2");
    }

    #[test]
    fn test_dragged_stop_excluded_from_own_route() {
        // Dragging s2 within its own route: s2 itself must not anchor the
        // nearest-stop search or appear in the slot scan.
        let routes = vec![route(
            "r1",
            vec![
                stop("s1", "r1", 1, 36.1000, -115.1000),
                stop("s2", "r1", 2, 36.1010, -115.1000),
                stop("s3", "r1", 3, 36.1020, -115.1000),
            ],
        )];
        let drop = LatLng::new(36.1025, -115.1000);
        let result =
            find_insertion_point(drop, &routes, None, "s2", &InsertionOptions::default()).unwrap();
        assert_eq!(result.route_id, "r1");
        // Slots are over [s1, s3]; past s3 means index 2.
        assert_eq!(result.insertion_index, 2);
    }
}
