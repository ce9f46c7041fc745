//! Viewport-scoped marker clustering.
//!
//! Greedy absorption at a fixed pixel radius: each unassigned in-viewport
//! marker seeds a cluster which absorbs every other unassigned in-viewport
//! marker within the grid size. Clusters are ephemeral; every recompute
//! discards and rebuilds them, so cluster ids never survive a viewport or
//! marker-set change.

use tracing::debug;

use crate::geo::{GeoBounds, LatLng};
use crate::model::MarkerData;
use crate::projection::{pixel_distance, ProjectionProvider};

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Absorption radius in pixels at the current zoom.
    pub grid_size_px: f64,
    /// Above this zoom clustering is disabled entirely.
    pub max_zoom: f64,
    /// Clusters smaller than this render as individual markers instead.
    pub min_cluster_size: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            grid_size_px: 60.0,
            max_zoom: 15.0,
            min_cluster_size: 3,
        }
    }
}

/// Icon scale/color tier, a step function of member count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTier {
    Small,
    Medium,
    Large,
}

impl ClusterTier {
    pub fn for_size(size: usize) -> Self {
        match size {
            _ if size >= 25 => ClusterTier::Large,
            _ if size >= 10 => ClusterTier::Medium,
            _ => ClusterTier::Small,
        }
    }
}

/// An ephemeral visual grouping of nearby markers.
///
/// Identity does not survive a recompute; ids are only stable within one
/// [`ClusterEngine::recompute`] result.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: u32,
    pub centroid: LatLng,
    pub bounds: GeoBounds,
    pub member_ids: Vec<String>,
    pub tier: ClusterTier,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }
}

/// What the render layer should draw after a recompute.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    pub clusters: Vec<Cluster>,
    /// Markers below the cluster threshold or outside clustering, drawn
    /// individually.
    pub single_markers: Vec<MarkerData>,
}

/// Clusters markers as a function of viewport and zoom.
///
/// Scoped to one view: construct alongside the map widget and drop at
/// teardown. Holds no provider handle; the provider is passed per
/// recompute.
#[derive(Debug)]
pub struct ClusterEngine {
    options: ClusterOptions,
    markers: Vec<MarkerData>,
    view: ClusterView,
}

impl ClusterEngine {
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            options,
            markers: Vec::new(),
            view: ClusterView::default(),
        }
    }

    /// Replaces the marker set. Call `recompute` afterwards; stale clusters
    /// are not patched incrementally.
    pub fn set_markers(&mut self, markers: Vec<MarkerData>) {
        self.markers = markers;
    }

    /// The last computed view.
    pub fn clusters(&self) -> &ClusterView {
        &self.view
    }

    /// Rebuilds clusters for the provider's current viewport at `zoom`.
    ///
    /// Markers outside the viewport are omitted entirely; markers whose
    /// pixel distance is unavailable (projection not ready) never absorb
    /// into a cluster and render individually.
    pub fn recompute<P: ProjectionProvider>(&mut self, provider: &P, zoom: f64) -> &ClusterView {
        self.view = self.build_view(provider, zoom);
        debug!(
            clusters = self.view.clusters.len(),
            singles = self.view.single_markers.len(),
            zoom,
            "clusters rebuilt"
        );
        &self.view
    }

    fn build_view<P: ProjectionProvider>(&self, provider: &P, zoom: f64) -> ClusterView {
        let Some(viewport) = provider.viewport_bounds() else {
            return ClusterView::default();
        };

        let in_view: Vec<&MarkerData> = self
            .markers
            .iter()
            .filter(|m| viewport.contains(m.position))
            .collect();

        // Past max zoom markers render directly.
        if zoom > self.options.max_zoom {
            return ClusterView {
                clusters: Vec::new(),
                single_markers: in_view.into_iter().cloned().collect(),
            };
        }

        let mut assigned = vec![false; in_view.len()];
        let mut clusters = Vec::new();
        let mut singles = Vec::new();
        let mut next_id = 0u32;

        for seed_idx in 0..in_view.len() {
            if assigned[seed_idx] {
                continue;
            }
            assigned[seed_idx] = true;

            let seed = in_view[seed_idx];
            let mut members = vec![seed_idx];
            let mut bounds = GeoBounds::new(
                seed.position.lat,
                seed.position.lng,
                seed.position.lat,
                seed.position.lng,
            );
            // Centroid is the bounding-box center, recomputed as members
            // join, so absorption is measured against the evolving cluster
            // rather than the seed.
            let mut centroid = seed.position;

            for other_idx in 0..in_view.len() {
                if assigned[other_idx] {
                    continue;
                }
                let d = pixel_distance(provider, centroid, in_view[other_idx].position, zoom);
                if d <= self.options.grid_size_px {
                    assigned[other_idx] = true;
                    members.push(other_idx);
                    bounds.extend(in_view[other_idx].position);
                    centroid = bounds.center();
                }
            }

            if members.len() >= self.options.min_cluster_size {
                clusters.push(Cluster {
                    id: next_id,
                    centroid,
                    bounds,
                    member_ids: members.iter().map(|&i| in_view[i].id.clone()).collect(),
                    tier: ClusterTier::for_size(members.len()),
                });
                next_id += 1;
            } else {
                singles.extend(members.iter().map(|&i| in_view[i].clone()));
            }
        }

        ClusterView {
            clusters,
            single_markers: singles,
        }
    }
}
