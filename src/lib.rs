//! fleet-viz: real-time fleet/route visualization engine
//!
//! Renders many concurrently moving vehicles and delivery stops, keeps the
//! rendering synchronized with a streaming state feed, and computes where a
//! dragged stop should be re-inserted. All mutations originated here are
//! proposals; authoritative commits come from an external collaborator.

pub mod animator;
pub mod cluster;
pub mod drag;
pub mod geo;
pub mod insertion;
pub mod model;
pub mod persist;
pub mod polyline;
pub mod projection;
pub mod render;
pub mod state;
pub mod sync;
pub mod viewport;
