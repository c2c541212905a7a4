//! Negotiation coordinator: turns transport callbacks and local responses
//! into inbox entries, responder bookkeeping and definition lookups.

use std::sync::Arc;

use negotiator_core::{
    ContractOffer, InboxEntry, InboxLog, Negotiation, NegotiationEvent, NegotiationId,
    NegotiationState, NegotiatorError, NegotiatorResult, ResponderRegistry, TrustedContract,
};
use tokio::runtime::Handle;

use crate::definitions::{DefinitionFetcher, DefinitionSource};
use crate::state_machine::NegotiationTracker;
use crate::transport::{NegotiationHandler, NegotiationTransport, OfferResponder};

/// An offer we received and have not yet answered.
struct PendingOffer {
    negotiation: Negotiation,
    responder: Box<dyn OfferResponder>,
}

/// Owns the inbox and the pending responders of one party.
pub struct NegotiationCoordinator {
    transport: Arc<dyn NegotiationTransport>,
    inbox: Arc<InboxLog>,
    responders: ResponderRegistry<PendingOffer>,
    tracker: NegotiationTracker,
    definitions: Option<DefinitionFetcher>,
}

impl NegotiationCoordinator {
    /// Create a coordinator without definition enrichment.
    pub fn new(transport: Arc<dyn NegotiationTransport>) -> Self {
        Self {
            transport,
            inbox: Arc::new(InboxLog::new()),
            responders: ResponderRegistry::new(),
            tracker: NegotiationTracker::new(),
            definitions: None,
        }
    }

    /// Enrich the inbox with definitions from `source`, looked up on `runtime`.
    pub fn with_definitions(mut self, source: Arc<dyn DefinitionSource>, runtime: Handle) -> Self {
        self.definitions = Some(DefinitionFetcher::new(
            source,
            Arc::clone(&self.inbox),
            runtime,
        ));
        self
    }

    pub fn inbox(&self) -> &Arc<InboxLog> {
        &self.inbox
    }

    /// Inbox entries from `offset` on.
    pub fn entries_from(&self, offset: usize) -> Vec<InboxEntry> {
        self.inbox.read_from(offset)
    }

    pub fn state(&self, id: NegotiationId) -> Option<NegotiationState> {
        self.tracker.state(id)
    }

    /// Negotiations with an offer awaiting our response.
    pub fn pending_ids(&self) -> Vec<NegotiationId> {
        self.responders.pending_ids()
    }

    /// Receive offers addressed to `party`.
    pub async fn listen(self: &Arc<Self>, party: &str) -> NegotiatorResult<()> {
        let handler: Arc<dyn NegotiationHandler> = self.clone();
        self.transport.listen(party, handler).await?;
        tracing::info!("Listening for offers addressed to {}", party);
        Ok(())
    }

    /// Send an opening offer. Nothing is recorded if the transport fails.
    pub async fn submit_offer(self: &Arc<Self>, offer: ContractOffer) -> NegotiatorResult<NegotiationId> {
        let receiver = offer.receiver_name.clone();
        let handler: Arc<dyn NegotiationHandler> = self.clone();
        let id = self.transport.offer(offer, handler).await?;

        tracing::info!("Submitted offer {} to {}", id, receiver);
        self.track(id, NegotiationEvent::OfferSent);
        Ok(id)
    }

    /// Accept the pending offer of negotiation `id`.
    pub async fn accept_offer(&self, id: NegotiationId) -> NegotiatorResult<()> {
        let pending = self.responders.take(id)?;
        pending.responder.accept().await?;

        tracing::info!("Accepted offer {}", id);
        self.track(id, NegotiationEvent::Accepted);
        self.fetch_by_id(id);
        Ok(())
    }

    /// Answer the pending offer of negotiation `id` with a counter-offer.
    pub async fn counter_offer(
        &self,
        id: NegotiationId,
        validity: chrono::Duration,
        contracts: Vec<TrustedContract>,
    ) -> NegotiatorResult<()> {
        let pending = self.responders.take(id)?;
        let counter = pending.negotiation.offer.counter(validity, contracts);
        pending.responder.counter(counter).await?;

        tracing::info!("Countered offer {}", id);
        self.track(id, NegotiationEvent::OfferSent);
        Ok(())
    }

    /// Reject the pending offer of negotiation `id`.
    pub async fn reject_offer(&self, id: NegotiationId) -> NegotiatorResult<()> {
        let pending = self.responders.take(id)?;
        pending.responder.reject().await?;

        tracing::info!("Rejected offer {}", id);
        self.track(id, NegotiationEvent::Rejected);
        self.fetch_by_id(id);
        Ok(())
    }

    /// Wait for outstanding definition lookups.
    pub async fn settle(&self) {
        if let Some(definitions) = &self.definitions {
            definitions.settle().await;
        }
    }

    fn track(&self, id: NegotiationId, event: NegotiationEvent) {
        if let Err(e) = self.tracker.apply(id, event) {
            tracing::warn!("{}", e);
        }
    }

    fn fetch_by_id(&self, id: NegotiationId) {
        if let Some(definitions) = &self.definitions {
            definitions.spawn_by_id(id);
        }
    }

    fn retire_responder(&self, id: NegotiationId) {
        if self.responders.discard(id).is_some() {
            tracing::debug!("Dropped unanswered responder for negotiation {}", id);
        }
    }
}

impl NegotiationHandler for NegotiationCoordinator {
    fn on_accept(&self, negotiation: Negotiation) {
        self.track(negotiation.id, NegotiationEvent::Accepted);
        self.inbox.append(InboxEntry::offer_accepted(&negotiation));
        self.fetch_by_id(negotiation.id);
    }

    fn on_offer(&self, negotiation: Negotiation, responder: Box<dyn OfferResponder>) {
        let id = negotiation.id;
        let pending = PendingOffer {
            negotiation: negotiation.clone(),
            responder,
        };
        if self.responders.put(id, pending).is_some() {
            tracing::warn!(
                "Offer {} superseded an unanswered offer; the earlier one can no longer be answered",
                id
            );
        }

        self.track(id, NegotiationEvent::OfferReceived);
        self.inbox.append(InboxEntry::offer_submitted(&negotiation));

        if let Some(definitions) = &self.definitions {
            definitions.spawn_by_id(id);
            definitions.spawn_by_hash(id, &negotiation.offer);
        }
    }

    fn on_reject(&self, negotiation: Negotiation) {
        self.track(negotiation.id, NegotiationEvent::Rejected);
        self.inbox.append(InboxEntry::offer_rejected(&negotiation));
        self.fetch_by_id(negotiation.id);
    }

    fn on_expiry(&self, id: NegotiationId) {
        self.retire_responder(id);
        self.track(id, NegotiationEvent::Expired);
        self.inbox.append(InboxEntry::offer_expired(id));
    }

    fn on_fault(&self, id: NegotiationId, error: NegotiatorError) {
        let message = match &error {
            NegotiatorError::Transport(message) | NegotiatorError::Protocol(message) => {
                message.clone()
            }
            other => other.to_string(),
        };
        tracing::warn!("Negotiation {} faulted: {}", id, message);

        self.retire_responder(id);
        self.track(id, NegotiationEvent::Faulted(message.clone()));
        self.inbox.append(InboxEntry::offer_faulted(id, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::tests::StaticDefinitions;
    use async_trait::async_trait;
    use negotiator_core::{EntryKind, InboxEvent};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Transport that hands out fixed ids and remembers how responders were used.
    #[derive(Default)]
    struct RecordingTransport {
        next_id: Mutex<NegotiationId>,
        fail: bool,
    }

    #[async_trait]
    impl NegotiationTransport for RecordingTransport {
        async fn offer(
            &self,
            _offer: ContractOffer,
            _handler: Arc<dyn NegotiationHandler>,
        ) -> NegotiatorResult<NegotiationId> {
            if self.fail {
                return Err(NegotiatorError::Transport("no route".into()));
            }
            let mut next = self.next_id.lock();
            *next += 1;
            Ok(*next)
        }

        async fn listen(
            &self,
            _party: &str,
            _handler: Arc<dyn NegotiationHandler>,
        ) -> NegotiatorResult<()> {
            Ok(())
        }
    }

    struct RecordingResponder {
        id: NegotiationId,
        actions: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl OfferResponder for RecordingResponder {
        fn negotiation_id(&self) -> NegotiationId {
            self.id
        }

        async fn accept(self: Box<Self>) -> NegotiatorResult<()> {
            self.actions.lock().push(format!("accept {}", self.id));
            Ok(())
        }

        async fn counter(self: Box<Self>, offer: ContractOffer) -> NegotiatorResult<()> {
            self.actions
                .lock()
                .push(format!("counter {} to {}", self.id, offer.receiver_name));
            Ok(())
        }

        async fn reject(self: Box<Self>) -> NegotiatorResult<()> {
            self.actions.lock().push(format!("reject {}", self.id));
            Ok(())
        }
    }

    fn negotiation(id: NegotiationId, arguments: &[(&str, &str)]) -> Negotiation {
        let contract = arguments
            .iter()
            .fold(TrustedContract::new("purchase.txt"), |c, (k, v)| {
                c.with_argument(*k, *v)
            });
        Negotiation {
            id,
            offer: ContractOffer::new("seller", "buyer", chrono::Duration::minutes(3), vec![contract]),
        }
    }

    fn responder(id: NegotiationId, actions: &Arc<Mutex<Vec<String>>>) -> Box<dyn OfferResponder> {
        Box::new(RecordingResponder {
            id,
            actions: Arc::clone(actions),
        })
    }

    fn coordinator() -> Arc<NegotiationCoordinator> {
        Arc::new(NegotiationCoordinator::new(Arc::new(RecordingTransport::default())))
    }

    fn enriched(source: StaticDefinitions) -> Arc<NegotiationCoordinator> {
        Arc::new(
            NegotiationCoordinator::new(Arc::new(RecordingTransport::default()))
                .with_definitions(Arc::new(source), Handle::current()),
        )
    }

    #[tokio::test]
    async fn offer_is_logged_and_enriched_by_id_and_hash() {
        let mut source = StaticDefinitions::default();
        source.by_id.insert(42, vec![json!({"doc": "by-id"})]);
        source.by_hash.insert("h1".into(), vec![json!({"doc": "by-hash"})]);
        let coordinator = enriched(source);
        let actions = Arc::new(Mutex::new(Vec::new()));

        coordinator.on_offer(negotiation(42, &[("terms:hash", "h1")]), responder(42, &actions));
        coordinator.settle().await;

        let entries = coordinator.entries_from(0);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind(), EntryKind::OfferSubmitted);
        assert_eq!(entries[0].negotiation_id(), 42);

        let mut definition_ids: Vec<_> = entries[1..]
            .iter()
            .map(|e| (e.kind(), e.wire_negotiation_id()))
            .collect();
        definition_ids.sort_by_key(|(_, id)| *id);
        assert_eq!(
            definition_ids,
            vec![
                (EntryKind::DefinitionFound, -42),
                (EntryKind::DefinitionFound, 42)
            ]
        );
        assert_eq!(coordinator.pending_ids(), vec![42]);
        assert_eq!(coordinator.state(42), Some(NegotiationState::AwaitingResponse));
    }

    #[tokio::test]
    async fn accept_without_responder_fails_and_logs_nothing() {
        let coordinator = coordinator();
        let result = coordinator.accept_offer(7).await;
        assert!(matches!(result, Err(NegotiatorError::UnknownNegotiation(7))));
        assert!(coordinator.inbox().is_empty());
    }

    #[tokio::test]
    async fn responder_is_used_once() {
        let coordinator = coordinator();
        let actions = Arc::new(Mutex::new(Vec::new()));
        coordinator.on_offer(negotiation(5, &[]), responder(5, &actions));

        coordinator.accept_offer(5).await.unwrap();
        assert!(matches!(
            coordinator.reject_offer(5).await,
            Err(NegotiatorError::UnknownNegotiation(5))
        ));
        assert_eq!(*actions.lock(), vec!["accept 5".to_string()]);
        assert_eq!(coordinator.state(5), Some(NegotiationState::Accepted));
    }

    #[tokio::test]
    async fn counter_offer_goes_back_to_offeror() {
        let coordinator = coordinator();
        let actions = Arc::new(Mutex::new(Vec::new()));
        coordinator.on_offer(negotiation(6, &[]), responder(6, &actions));

        coordinator
            .counter_offer(6, chrono::Duration::minutes(3), vec![TrustedContract::new("t")])
            .await
            .unwrap();
        assert_eq!(*actions.lock(), vec!["counter 6 to seller".to_string()]);
        assert_eq!(coordinator.state(6), Some(NegotiationState::Submitted));
        assert!(coordinator.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn local_accept_and_reject_trigger_definition_lookup() {
        let mut source = StaticDefinitions::default();
        source.by_id.insert(8, vec![json!("d8")]);
        source.by_id.insert(9, vec![json!("d9")]);
        let coordinator = enriched(source);
        let actions = Arc::new(Mutex::new(Vec::new()));

        coordinator.on_offer(negotiation(8, &[]), responder(8, &actions));
        coordinator.on_offer(negotiation(9, &[]), responder(9, &actions));
        coordinator.settle().await;
        let before = coordinator.inbox().len();

        coordinator.accept_offer(8).await.unwrap();
        coordinator.reject_offer(9).await.unwrap();
        coordinator.settle().await;

        let added = coordinator.entries_from(before);
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|e| e.kind() == EntryKind::DefinitionFound));
    }

    #[tokio::test]
    async fn fault_appends_single_entry() {
        let coordinator = coordinator();
        coordinator.on_fault(9, NegotiatorError::Transport("timeout".into()));

        let entries = coordinator.entries_from(0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), EntryKind::OfferFaulted);
        assert_eq!(entries[0].negotiation_id(), 9);
        assert_eq!(entries[0].error(), Some("timeout"));
        assert!(entries[0].offer().is_none());
        assert!(entries[0].definition().is_none());
    }

    #[tokio::test]
    async fn expiry_retires_pending_responder() {
        let coordinator = coordinator();
        let actions = Arc::new(Mutex::new(Vec::new()));
        coordinator.on_offer(negotiation(11, &[]), responder(11, &actions));

        coordinator.on_expiry(11);
        assert_eq!(coordinator.entries_from(1)[0].event(), &InboxEvent::OfferExpired);
        assert!(matches!(
            coordinator.accept_offer(11).await,
            Err(NegotiatorError::UnknownNegotiation(11))
        ));
        assert!(actions.lock().is_empty());
    }

    #[tokio::test]
    async fn superseding_offer_replaces_responder() {
        let coordinator = coordinator();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        coordinator.on_offer(negotiation(12, &[]), responder(12, &first));
        coordinator.on_offer(negotiation(12, &[]), responder(12, &second));

        coordinator.reject_offer(12).await.unwrap();
        assert!(first.lock().is_empty());
        assert_eq!(*second.lock(), vec!["reject 12".to_string()]);
        assert_eq!(coordinator.inbox().len(), 2);
    }

    #[tokio::test]
    async fn remote_accept_and_reject_are_logged() {
        let coordinator = coordinator();
        coordinator.on_accept(negotiation(20, &[]));
        coordinator.on_reject(negotiation(21, &[]));

        let kinds: Vec<_> = coordinator.entries_from(0).iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EntryKind::OfferAccepted, EntryKind::OfferRejected]);
    }

    #[tokio::test]
    async fn submit_offer_tracks_id() {
        let coordinator = coordinator();
        let offer = ContractOffer::new("buyer", "seller", chrono::Duration::minutes(3), vec![]);
        let id = coordinator.submit_offer(offer).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(coordinator.state(id), Some(NegotiationState::Submitted));
        assert!(coordinator.inbox().is_empty());
    }

    #[tokio::test]
    async fn failed_submit_records_nothing() {
        let coordinator = Arc::new(NegotiationCoordinator::new(Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        })));
        let offer = ContractOffer::new("buyer", "seller", chrono::Duration::minutes(3), vec![]);

        let result = coordinator.submit_offer(offer).await;
        assert!(matches!(result, Err(NegotiatorError::Transport(_))));
        assert!(coordinator.inbox().is_empty());
        assert_eq!(coordinator.state(1), None);
    }
}
