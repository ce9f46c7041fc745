//! Engine-owned drag session.
//!
//! One session object coordinates drag start/end for every marker instead
//! of ambient global events, which makes the single-in-flight-drag rule
//! enforceable in one place. The drop produces a reassignment proposal and
//! an optimistic local placement; the authoritative answer either confirms
//! it or rolls the stop back to exactly where it was.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::LatLng;
use crate::insertion::{find_insertion_point, InsertionOptions};
use crate::model::ReassignmentProposal;
use crate::state::FleetState;

#[derive(Debug, Error, PartialEq)]
pub enum DragError {
    #[error("a drag is already in flight")]
    AlreadyInFlight,
    #[error("unknown stop {0}")]
    UnknownStop(String),
    #[error("no drag in progress")]
    NotDragging,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Dragging {
        stop_id: String,
        from_route_id: String,
        from_index: u32,
    },
    AwaitingAck {
        proposal: ReassignmentProposal,
    },
}

/// Outcome of a drop gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// A proposal was emitted and applied tentatively; the session now
    /// waits for the collaborator's accept/reject.
    Proposed(ReassignmentProposal),
    /// No route within snap distance; the stop stays where it was.
    NoMatch,
}

#[derive(Debug)]
pub struct DragSession {
    phase: Phase,
    hovered_route_id: Option<String>,
    options: InsertionOptions,
}

impl DragSession {
    pub fn new(options: InsertionOptions) -> Self {
        Self {
            phase: Phase::Idle,
            hovered_route_id: None,
            options,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Begins dragging a stop. Rejected while another drag is in flight,
    /// including one still waiting for its accept/reject.
    pub fn start(&mut self, state: &FleetState, stop_id: &str) -> Result<(), DragError> {
        if self.phase != Phase::Idle {
            return Err(DragError::AlreadyInFlight);
        }
        let Some((route_id, sequence)) = state.routes().find_map(|route| {
            route
                .stops
                .iter()
                .find(|s| s.id == stop_id)
                .map(|s| (route.id.clone(), s.sequence))
        }) else {
            return Err(DragError::UnknownStop(stop_id.to_string()));
        };
        debug!(stop_id, %route_id, sequence, "drag started");
        self.phase = Phase::Dragging {
            stop_id: stop_id.to_string(),
            from_route_id: route_id,
            from_index: sequence,
        };
        Ok(())
    }

    /// Route currently highlighted under the drag cursor, if any. It takes
    /// precedence over nearest-stop candidate selection at drop time.
    pub fn set_hovered_route(&mut self, route_id: Option<&str>) {
        self.hovered_route_id = route_id.map(str::to_string);
    }

    /// Ends the drag at `drop_position`.
    ///
    /// On a match the reassignment applies to local state immediately (the
    /// tentative placement) and the returned proposal must be forwarded to
    /// the persistence collaborator, whose answer resolves the session via
    /// [`DragSession::resolve`].
    pub fn end(
        &mut self,
        state: &mut FleetState,
        drop_position: LatLng,
    ) -> Result<DropOutcome, DragError> {
        let Phase::Dragging {
            stop_id,
            from_route_id,
            from_index,
        } = self.phase.clone()
        else {
            return Err(DragError::NotDragging);
        };

        let routes = state.routes_sorted();
        let found = find_insertion_point(
            drop_position,
            &routes,
            self.hovered_route_id.as_deref(),
            &stop_id,
            &self.options,
        );
        self.hovered_route_id = None;

        let Some(point) = found else {
            debug!(%stop_id, "drop outside snap distance, no match");
            self.phase = Phase::Idle;
            return Ok(DropOutcome::NoMatch);
        };

        let proposal = ReassignmentProposal {
            stop_id: stop_id.clone(),
            from_route_id,
            to_route_id: point.route_id,
            from_index,
            to_index: point.insertion_index as u32 + 1,
        };

        if !state.apply_reassignment(&proposal) {
            warn!(%stop_id, "tentative placement no longer applies");
            self.phase = Phase::Idle;
            return Ok(DropOutcome::NoMatch);
        }

        info!(
            %stop_id,
            to_route = %proposal.to_route_id,
            to_index = proposal.to_index,
            detour_m = point.detour_cost_m,
            "reassignment proposed"
        );
        self.phase = Phase::AwaitingAck {
            proposal: proposal.clone(),
        };
        Ok(DropOutcome::Proposed(proposal))
    }

    /// Abandons a drag that never dropped (escape key, pointer cancel).
    pub fn cancel(&mut self) {
        if matches!(self.phase, Phase::Dragging { .. }) {
            self.phase = Phase::Idle;
        }
        self.hovered_route_id = None;
    }

    /// Applies the collaborator's verdict on the pending proposal.
    ///
    /// Acceptance keeps the tentative placement; rejection moves the stop
    /// back to its pre-drag route and index, leaving every other stop's
    /// sequence as it was.
    pub fn resolve(&mut self, state: &mut FleetState, accepted: bool) -> Result<(), DragError> {
        let Phase::AwaitingAck { proposal } = self.phase.clone() else {
            return Err(DragError::NotDragging);
        };
        self.phase = Phase::Idle;

        if accepted {
            info!(stop_id = %proposal.stop_id, "reassignment confirmed");
            return Ok(());
        }

        // Current sequence of the stop on its tentative route; the reverse
        // move restores the original ordering exactly.
        let current_index = state
            .route(&proposal.to_route_id)
            .and_then(|r| r.stops.iter().find(|s| s.id == proposal.stop_id))
            .map(|s| s.sequence);
        let Some(current_index) = current_index else {
            warn!(stop_id = %proposal.stop_id, "rejected proposal but stop is gone");
            return Ok(());
        };

        let revert = ReassignmentProposal {
            stop_id: proposal.stop_id.clone(),
            from_route_id: proposal.to_route_id.clone(),
            to_route_id: proposal.from_route_id.clone(),
            from_index: current_index,
            to_index: proposal.from_index,
        };
        if state.apply_reassignment(&revert) {
            info!(stop_id = %proposal.stop_id, "reassignment rejected, reverted");
        } else {
            warn!(stop_id = %proposal.stop_id, "revert did not apply cleanly");
        }
        Ok(())
    }
}
