//! Negotiation state automaton.

use serde::{Deserialize, Serialize};

/// Conceptual state of one negotiation, from our party's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationState {
    /// We sent an offer and await the counterparty.
    Submitted,
    /// The counterparty sent us an offer; a response capability is registered.
    AwaitingResponse,
    Accepted,
    Rejected,
    Expired,
    Faulted,
}

impl NegotiationState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Expired | Self::Faulted
        )
    }

    /// Get valid transitions from current state.
    pub fn valid_transitions(&self) -> &'static [NegotiationState] {
        match self {
            Self::Submitted | Self::AwaitingResponse => &[
                Self::Submitted,
                Self::AwaitingResponse,
                Self::Accepted,
                Self::Rejected,
                Self::Expired,
                Self::Faulted,
            ],
            Self::Accepted | Self::Rejected | Self::Expired | Self::Faulted => &[],
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: NegotiationState) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// State entered when `event` happens, independent of the current state.
    pub fn after(event: &NegotiationEvent) -> NegotiationState {
        match event {
            NegotiationEvent::OfferSent => Self::Submitted,
            NegotiationEvent::OfferReceived => Self::AwaitingResponse,
            NegotiationEvent::Accepted => Self::Accepted,
            NegotiationEvent::Rejected => Self::Rejected,
            NegotiationEvent::Expired => Self::Expired,
            NegotiationEvent::Faulted(_) => Self::Faulted,
        }
    }
}

/// Events that drive negotiation state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    /// We submitted an offer or counter-offer.
    OfferSent,
    /// The counterparty submitted an offer or counter-offer.
    OfferReceived,
    /// Either party accepted.
    Accepted,
    /// Either party rejected.
    Rejected,
    /// The transport reported the validity window lapsed.
    Expired,
    /// The transport reported a failure.
    Faulted(String),
}
