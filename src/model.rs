//! Domain model: routes, stops, driver positions, and the stream protocol.
//!
//! Routes are mutable only via whole-route replacement pushed from the
//! authoritative source, or via a locally-proposed reassignment pending
//! confirmation. Stream messages are consumed once; only their effect on
//! this model persists.

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;
use crate::polyline::Polyline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStatus {
    NotStarted,
    InProgress,
    Completed,
    Delayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

/// Priority drives truncation order when the viewport holds more stops than
/// the marker cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPriority {
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub id: String,
    pub route_id: String,
    /// 1-based position within the route; contiguous, unique per route.
    pub sequence: u32,
    pub position: LatLng,
    pub status: StopStatus,
    pub priority: StopPriority,
    /// Payload summary (package count or similar).
    pub quantity: u32,
    /// Estimated arrival, unix millis.
    pub eta_ms: Option<i64>,
    /// Actual arrival, unix millis.
    pub arrived_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub driver_id: String,
    pub stops: Vec<RouteStop>,
    pub status: RouteStatus,
    /// Route path geometry, absent when the encoded path was malformed.
    pub path: Option<Polyline>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
}

impl Route {
    /// Checks the sequence invariant: indices are a permutation of 1..=N.
    pub fn sequences_contiguous(&self) -> bool {
        let mut seen: Vec<u32> = self.stops.iter().map(|s| s.sequence).collect();
        seen.sort_unstable();
        seen.iter()
            .enumerate()
            .all(|(i, &seq)| seq == (i + 1) as u32)
    }
}

/// Last-known vehicle position. Updates are monotonic in timestamp per
/// driver; stale updates are dropped on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPosition {
    pub driver_id: String,
    pub position: LatLng,
    pub timestamp_ms: i64,
    pub moving: bool,
}

/// Projection-ready marker representation for clustering and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    pub id: String,
    pub position: LatLng,
    pub stop_id: String,
    pub route_id: String,
}

impl MarkerData {
    pub fn for_stop(stop: &RouteStop) -> Self {
        Self {
            id: format!("stop:{}", stop.id),
            position: stop.position,
            stop_id: stop.id.clone(),
            route_id: stop.route_id.clone(),
        }
    }
}

/// Partial route update carried by a `route-update` message. Absent fields
/// leave the current value untouched; `stops` replaces the whole sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoutePatch {
    pub status: Option<RouteStatus>,
    pub stops: Option<Vec<RouteStop>>,
    pub path: Option<String>,
    pub total_distance_m: Option<f64>,
    pub total_duration_s: Option<f64>,
}

/// Inbound stream protocol: a JSON-tagged union, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamMessage {
    #[serde(rename_all = "camelCase")]
    DriverLocation {
        driver_id: String,
        position: LatLng,
        timestamp_ms: i64,
        #[serde(default)]
        moving: bool,
    },
    #[serde(rename_all = "camelCase")]
    RouteUpdate { route_id: String, patch: RoutePatch },
    #[serde(rename_all = "camelCase")]
    StopStatus { stop_id: String, status: StopStatus },
}

/// A single-stop reassignment emitted to the persistence collaborator.
/// Indices are 1-based, matching stop sequence numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentProposal {
    pub stop_id: String,
    pub from_route_id: String,
    pub to_route_id: String,
    pub from_index: u32,
    pub to_index: u32,
}
