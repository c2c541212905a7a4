//! Boundary to the negotiation transport.
//!
//! The transport carries offers between parties and reports what happens to
//! them through a [`NegotiationHandler`]. When a counterparty makes us an
//! offer it hands over an [`OfferResponder`], the one-shot right to answer it.

use std::sync::Arc;

use async_trait::async_trait;
use negotiator_core::{ContractOffer, Negotiation, NegotiationId, NegotiatorError, NegotiatorResult};

/// Receives negotiation callbacks. Callbacks may arrive concurrently from
/// independent threads.
pub trait NegotiationHandler: Send + Sync {
    /// The counterparty accepted the latest offer.
    fn on_accept(&self, negotiation: Negotiation);

    /// The counterparty made an offer or counter-offer we may respond to.
    fn on_offer(&self, negotiation: Negotiation, responder: Box<dyn OfferResponder>);

    /// The counterparty rejected the latest offer.
    fn on_reject(&self, negotiation: Negotiation);

    /// The validity window of the latest offer lapsed.
    fn on_expiry(&self, id: NegotiationId);

    /// The negotiation failed.
    fn on_fault(&self, id: NegotiationId, error: NegotiatorError);
}

/// One-shot right to respond to a pending offer. Each action consumes it.
#[async_trait]
pub trait OfferResponder: Send + Sync {
    /// Negotiation this responder answers.
    fn negotiation_id(&self) -> NegotiationId;

    async fn accept(self: Box<Self>) -> NegotiatorResult<()>;

    async fn counter(self: Box<Self>, offer: ContractOffer) -> NegotiatorResult<()>;

    async fn reject(self: Box<Self>) -> NegotiatorResult<()>;
}

/// Carries offers to remote parties.
#[async_trait]
pub trait NegotiationTransport: Send + Sync {
    /// Send an opening offer. The returned id correlates all later callbacks.
    async fn offer(
        &self,
        offer: ContractOffer,
        handler: Arc<dyn NegotiationHandler>,
    ) -> NegotiatorResult<NegotiationId>;

    /// Receive offers addressed to `party` through `handler`.
    async fn listen(&self, party: &str, handler: Arc<dyn NegotiationHandler>)
        -> NegotiatorResult<()>;
}
