//! In-memory fleet state.
//!
//! The single place stream-message effects land. Routes are replaced or
//! patched wholesale from the authoritative source; driver positions apply
//! only in non-decreasing timestamp order; stop sequences are renumbered to
//! stay a contiguous 1..=N permutation after any structural change.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::geo::LatLng;
use crate::model::{
    DriverPosition, MarkerData, ReassignmentProposal, Route, RoutePatch, StopStatus, StreamMessage,
};
use crate::polyline::Polyline;

/// A position change produced by applying a batch, for the animator.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverMove {
    pub driver_id: String,
    pub from: Option<LatLng>,
    pub to: LatLng,
}

#[derive(Debug, Default)]
pub struct FleetState {
    routes: HashMap<String, Route>,
    drivers: HashMap<String, DriverPosition>,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn driver(&self, driver_id: &str) -> Option<&DriverPosition> {
        self.drivers.get(driver_id)
    }

    /// All routes as a sorted slice-friendly Vec, for deterministic
    /// downstream computation (viewport selection, insertion candidates).
    pub fn routes_sorted(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    /// Markers for every stop across all routes, in route-id order.
    pub fn stop_markers(&self) -> Vec<MarkerData> {
        let mut markers = Vec::new();
        for route in self.routes_sorted() {
            markers.extend(route.stops.iter().map(MarkerData::for_stop));
        }
        markers
    }

    /// Whole-route replacement from the authoritative source.
    pub fn put_route(&mut self, mut route: Route) {
        renumber(&mut route);
        self.routes.insert(route.id.clone(), route);
    }

    pub fn remove_route(&mut self, route_id: &str) {
        self.routes.remove(route_id);
    }

    /// Applies one flushed batch in delivery order and reports driver moves
    /// for animation. Items that reference unknown entities are dropped and
    /// logged; the rest of the batch still applies.
    pub fn apply_batch(&mut self, batch: Vec<StreamMessage>) -> Vec<DriverMove> {
        let mut moves = Vec::new();
        for message in batch {
            match message {
                StreamMessage::DriverLocation {
                    driver_id,
                    position,
                    timestamp_ms,
                    moving,
                } => {
                    if let Some(m) = self.apply_location(driver_id, position, timestamp_ms, moving) {
                        moves.push(m);
                    }
                }
                StreamMessage::RouteUpdate { route_id, patch } => {
                    self.apply_route_patch(&route_id, patch);
                }
                StreamMessage::StopStatus { stop_id, status } => {
                    self.apply_stop_status(&stop_id, status);
                }
            }
        }
        moves
    }

    /// Monotonic-timestamp rule: an update older than the stored position is
    /// dropped.
    fn apply_location(
        &mut self,
        driver_id: String,
        position: LatLng,
        timestamp_ms: i64,
        moving: bool,
    ) -> Option<DriverMove> {
        if let Some(current) = self.drivers.get(&driver_id) {
            if timestamp_ms < current.timestamp_ms {
                debug!(
                    %driver_id,
                    timestamp_ms,
                    current = current.timestamp_ms,
                    "dropping out-of-order location"
                );
                return None;
            }
        }
        let from = self.drivers.get(&driver_id).map(|d| d.position);
        self.drivers.insert(
            driver_id.clone(),
            DriverPosition {
                driver_id: driver_id.clone(),
                position,
                timestamp_ms,
                moving,
            },
        );
        Some(DriverMove {
            driver_id,
            from,
            to: position,
        })
    }

    fn apply_route_patch(&mut self, route_id: &str, patch: RoutePatch) {
        let Some(route) = self.routes.get_mut(route_id) else {
            warn!(route_id, "route-update for unknown route dropped");
            return;
        };
        if let Some(status) = patch.status {
            route.status = status;
        }
        if let Some(stops) = patch.stops {
            route.stops = stops;
            renumber(route);
        }
        if let Some(encoded) = patch.path {
            // A malformed path degrades to "no renderable path".
            route.path = match Polyline::decode(&encoded) {
                Ok(polyline) => Some(polyline),
                Err(err) => {
                    warn!(route_id, %err, "malformed route path dropped");
                    None
                }
            };
        }
        if let Some(d) = patch.total_distance_m {
            route.total_distance_m = d;
        }
        if let Some(d) = patch.total_duration_s {
            route.total_duration_s = d;
        }
    }

    fn apply_stop_status(&mut self, stop_id: &str, status: StopStatus) {
        for route in self.routes.values_mut() {
            let Some(idx) = route.stops.iter().position(|s| s.id == stop_id) else {
                continue;
            };
            // At most one in-progress stop per route: a newly started stop
            // demotes the previous one.
            if status == StopStatus::InProgress {
                for (i, stop) in route.stops.iter_mut().enumerate() {
                    if i != idx && stop.status == StopStatus::InProgress {
                        debug!(
                            demoted = %stop.id,
                            started = stop_id,
                            "demoting previous in-progress stop"
                        );
                        stop.status = StopStatus::Pending;
                    }
                }
            }
            route.stops[idx].status = status;
            return;
        }
        warn!(stop_id, "stop-status for unknown stop dropped");
    }

    /// Moves a stop per an acknowledged reassignment proposal.
    ///
    /// Indices in the proposal are 1-based sequence numbers. Returns false
    /// (and changes nothing) when the proposal no longer matches the current
    /// state, e.g. the stop moved or a route disappeared meanwhile.
    pub fn apply_reassignment(&mut self, proposal: &ReassignmentProposal) -> bool {
        let Some(from_route) = self.routes.get(&proposal.from_route_id) else {
            warn!(route_id = %proposal.from_route_id, "reassignment from unknown route");
            return false;
        };
        let Some(stop_idx) = from_route.stops.iter().position(|s| s.id == proposal.stop_id) else {
            warn!(stop_id = %proposal.stop_id, "reassignment of unknown stop");
            return false;
        };
        if from_route.stops[stop_idx].sequence != proposal.from_index {
            warn!(stop_id = %proposal.stop_id, "reassignment source index stale");
            return false;
        }
        if !self.routes.contains_key(&proposal.to_route_id) {
            warn!(route_id = %proposal.to_route_id, "reassignment to unknown route");
            return false;
        }

        let Some(from_route) = self.routes.get_mut(&proposal.from_route_id) else {
            return false;
        };
        let mut stop = from_route.stops.remove(stop_idx);
        renumber(from_route);

        let Some(to_route) = self.routes.get_mut(&proposal.to_route_id) else {
            return false;
        };
        stop.route_id = to_route.id.clone();
        let insert_at = ((proposal.to_index.max(1) - 1) as usize).min(to_route.stops.len());
        to_route.stops.insert(insert_at, stop);
        renumber(to_route);
        true
    }
}

/// Restores the 1..=N contiguous sequence invariant in stop order.
fn renumber(route: &mut Route) {
    for (i, stop) in route.stops.iter_mut().enumerate() {
        stop.sequence = (i + 1) as u32;
        stop.route_id = route.id.clone();
    }
}
