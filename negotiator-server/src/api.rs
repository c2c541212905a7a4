//! Client-facing negotiation API.

use std::sync::Arc;

use negotiator_core::{
    ContractOffer, CounterOfferRequest, InboxEntry, NegotiationId, NegotiationRef,
    NegotiationStatus, NegotiatorError, NegotiatorResult, OfferCreated, OfferRequest,
};

use crate::coordinator::NegotiationCoordinator;

/// Validates client requests and forwards them to the coordinator.
#[derive(Clone)]
pub struct NegotiationApi {
    coordinator: Arc<NegotiationCoordinator>,
    party: String,
    offer_validity: chrono::Duration,
}

impl NegotiationApi {
    /// Create an API acting as `party`, making offers valid for `offer_validity`.
    pub fn new(
        coordinator: Arc<NegotiationCoordinator>,
        party: impl Into<String>,
        offer_validity: chrono::Duration,
    ) -> Self {
        Self {
            coordinator,
            party: party.into(),
            offer_validity,
        }
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn coordinator(&self) -> &Arc<NegotiationCoordinator> {
        &self.coordinator
    }

    pub async fn submit_offer(&self, request: OfferRequest) -> NegotiatorResult<OfferCreated> {
        let (receiver, terms) = request.validate()?;
        let offer = ContractOffer::new(self.party.clone(), receiver, self.offer_validity, terms);
        let id = self.coordinator.submit_offer(offer).await?;
        Ok(OfferCreated { id })
    }

    pub async fn accept_offer(&self, request: NegotiationRef) -> NegotiatorResult<()> {
        self.coordinator.accept_offer(request.validate()?).await
    }

    pub async fn counter_offer(&self, request: CounterOfferRequest) -> NegotiatorResult<()> {
        let (id, terms) = request.validate()?;
        self.coordinator
            .counter_offer(id, self.offer_validity, terms)
            .await
    }

    pub async fn reject_offer(&self, request: NegotiationRef) -> NegotiatorResult<()> {
        self.coordinator.reject_offer(request.validate()?).await
    }

    pub fn inbox_entries(&self, from: usize) -> Vec<InboxEntry> {
        self.coordinator.entries_from(from)
    }

    pub fn negotiation_status(&self, id: NegotiationId) -> NegotiatorResult<NegotiationStatus> {
        self.coordinator
            .state(id)
            .map(|state| NegotiationStatus { id, state })
            .ok_or(NegotiatorError::UnknownNegotiation(id))
    }
}
