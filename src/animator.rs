//! Per-marker position interpolation.
//!
//! Discrete location updates arrive a few seconds apart; markers glide
//! between them instead of jumping. The host calls [`PositionAnimator::tick`]
//! once per animation frame with the current clock and applies the returned
//! positions. Animations on different markers are independent.

use std::collections::HashMap;

use crate::geo::LatLng;

/// Ease-in/ease-out curve over progress `p` in [0, 1].
fn ease_in_out(p: f64) -> f64 {
    if p < 0.5 {
        2.0 * p * p
    } else {
        1.0 - (-2.0 * p + 2.0).powi(2) / 2.0
    }
}

#[derive(Debug, Clone)]
struct Animation {
    from: LatLng,
    to: LatLng,
    start_ms: i64,
    duration_ms: i64,
}

impl Animation {
    fn position_at(&self, now_ms: i64) -> LatLng {
        if self.duration_ms <= 0 {
            return self.to;
        }
        let p = ((now_ms - self.start_ms) as f64 / self.duration_ms as f64).clamp(0.0, 1.0);
        let eased = ease_in_out(p);
        LatLng::new(
            self.from.lat + (self.to.lat - self.from.lat) * eased,
            self.from.lng + (self.to.lng - self.from.lng) * eased,
        )
    }

    fn finished(&self, now_ms: i64) -> bool {
        now_ms - self.start_ms >= self.duration_ms
    }
}

/// A marker position produced by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedPosition {
    pub marker_id: String,
    pub position: LatLng,
    pub finished: bool,
}

#[derive(Debug, Default)]
pub struct PositionAnimator {
    animations: HashMap<String, Animation>,
}

impl PositionAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or supersedes) an animation for a marker.
    ///
    /// If the marker already has an animation in flight, the new one starts
    /// from its current interpolated position, not from `from`, so there is
    /// no visual snap at the handover.
    pub fn animate(&mut self, marker_id: &str, from: LatLng, to: LatLng, duration_ms: i64, now_ms: i64) {
        let start = match self.animations.get(marker_id) {
            Some(current) if !current.finished(now_ms) => current.position_at(now_ms),
            _ => from,
        };
        self.animations.insert(
            marker_id.to_string(),
            Animation {
                from: start,
                to,
                start_ms: now_ms,
                duration_ms,
            },
        );
    }

    /// Advances all animations to `now_ms` and returns the positions to
    /// apply. Finished animations are removed after reporting their final
    /// position once.
    pub fn tick(&mut self, now_ms: i64) -> Vec<AnimatedPosition> {
        let mut out: Vec<AnimatedPosition> = self
            .animations
            .iter()
            .map(|(id, anim)| AnimatedPosition {
                marker_id: id.clone(),
                position: anim.position_at(now_ms),
                finished: anim.finished(now_ms),
            })
            .collect();
        // Stable output order for render diffing.
        out.sort_by(|a, b| a.marker_id.cmp(&b.marker_id));
        self.animations.retain(|_, anim| !anim.finished(now_ms));
        out
    }

    /// Drops a single marker's animation, if any.
    pub fn cancel(&mut self, marker_id: &str) {
        self.animations.remove(marker_id);
    }

    /// Drops every in-flight animation. Part of view teardown.
    pub fn cancel_all(&mut self) {
        self.animations.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.animations.len()
    }
}
