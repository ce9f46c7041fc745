//! Declarative marker reconciliation.
//!
//! The cluster and viewport layers describe *what* should be on screen;
//! this module diffs that desired state against the last-rendered state
//! into create/update/destroy commands. The concrete map provider only
//! ever executes command lists, so none of the algorithmic layers touch
//! its API directly.

use std::collections::HashMap;

use crate::cluster::ClusterView;
use crate::geo::LatLng;

/// What a rendered marker looks like, provider-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerKind {
    Stop { stop_id: String, route_id: String },
    Cluster { size: usize },
    Vehicle { driver_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredMarker {
    pub id: String,
    pub position: LatLng,
    pub kind: MarkerKind,
}

/// One imperative step for the map provider to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Create(DesiredMarker),
    /// Position or kind changed for an existing id.
    Update(DesiredMarker),
    Destroy(String),
}

/// Tracks the last-applied marker set and emits the minimal op list to
/// reach each new desired set.
#[derive(Debug, Default)]
pub struct MarkerReconciler {
    current: HashMap<String, DesiredMarker>,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `desired` against the applied state. Ops come out in a stable
    /// order: destroys, then creates, then updates, each sorted by id.
    pub fn reconcile(&mut self, desired: &[DesiredMarker]) -> Vec<MarkerOp> {
        let mut ops = Vec::new();
        let desired_by_id: HashMap<&str, &DesiredMarker> =
            desired.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut removed: Vec<String> = self
            .current
            .keys()
            .filter(|id| !desired_by_id.contains_key(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        for id in removed {
            self.current.remove(&id);
            ops.push(MarkerOp::Destroy(id));
        }

        let mut added = Vec::new();
        let mut changed = Vec::new();
        for marker in desired {
            match self.current.get(&marker.id) {
                None => added.push(marker.clone()),
                Some(existing) if existing != marker => changed.push(marker.clone()),
                Some(_) => {}
            }
        }
        added.sort_by(|a, b| a.id.cmp(&b.id));
        changed.sort_by(|a, b| a.id.cmp(&b.id));

        for marker in added {
            self.current.insert(marker.id.clone(), marker.clone());
            ops.push(MarkerOp::Create(marker));
        }
        for marker in changed {
            self.current.insert(marker.id.clone(), marker.clone());
            ops.push(MarkerOp::Update(marker));
        }

        ops
    }

    /// Desired markers for a cluster view: clusters plus the markers that
    /// render individually.
    pub fn desired_from_clusters(view: &ClusterView) -> Vec<DesiredMarker> {
        let mut desired = Vec::new();
        for cluster in &view.clusters {
            desired.push(DesiredMarker {
                id: format!("cluster:{}", cluster.id),
                position: cluster.centroid,
                kind: MarkerKind::Cluster {
                    size: cluster.size(),
                },
            });
        }
        for marker in &view.single_markers {
            desired.push(DesiredMarker {
                id: marker.id.clone(),
                position: marker.position,
                kind: MarkerKind::Stop {
                    stop_id: marker.stop_id.clone(),
                    route_id: marker.route_id.clone(),
                },
            });
        }
        desired
    }

    /// Forgets everything, so the next reconcile recreates from scratch.
    /// Used when the provider's marker layer was torn down externally.
    pub fn reset(&mut self) {
        self.current.clear();
    }
}
