//! Per-negotiation state tracking.

use std::collections::HashMap;

use parking_lot::Mutex;

use negotiator_core::{
    NegotiationEvent, NegotiationId, NegotiationState, NegotiatorError, NegotiatorResult,
};

/// Tracks the state of every negotiation seen by this party.
///
/// The tracker is informational. An invalid transition is reported to the
/// caller but the inbox is never held back because of one.
#[derive(Default)]
pub struct NegotiationTracker {
    states: Mutex<HashMap<NegotiationId, NegotiationState>>,
}

impl NegotiationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state of a negotiation.
    pub fn state(&self, id: NegotiationId) -> Option<NegotiationState> {
        self.states.lock().get(&id).copied()
    }

    /// Apply `event` to negotiation `id`, returning the new state.
    ///
    /// Unknown negotiations start in whatever state the event leads to.
    /// Terminal negotiations keep their state and yield an error.
    pub fn apply(&self, id: NegotiationId, event: NegotiationEvent) -> NegotiatorResult<NegotiationState> {
        let target = NegotiationState::after(&event);
        let mut states = self.states.lock();

        match states.get(&id).copied() {
            None => {
                tracing::debug!("Negotiation {} starts as {:?}", id, target);
                states.insert(id, target);
                Ok(target)
            }
            Some(current) if current.can_transition_to(target) => {
                tracing::debug!("Negotiation {}: {:?} -> {:?}", id, current, target);
                states.insert(id, target);
                Ok(target)
            }
            Some(current) => Err(NegotiatorError::Protocol(format!(
                "Invalid transition for negotiation {}: {:?} -> {:?} on {:?}",
                id, current, target, event
            ))),
        }
    }

    /// Number of negotiations not yet in a terminal state.
    pub fn open_count(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|state| !state.is_terminal())
            .count()
    }
}
