//! In-process negotiation transport.
//!
//! Connects parties living in the same process. Every callback is delivered
//! on its own task, and validity windows are enforced with timers that raise
//! `on_expiry` for both parties when the latest offer lapses unanswered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;

use negotiator_core::{ContractOffer, Negotiation, NegotiationId, NegotiatorError, NegotiatorResult};

use crate::transport::{NegotiationHandler, NegotiationTransport, OfferResponder};

/// Transport linking parties registered in this process.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

struct Inner {
    next_id: AtomicI64,
    listeners: Mutex<HashMap<String, Arc<dyn NegotiationHandler>>>,
    /// Open negotiations. A session is removed as soon as it closes.
    sessions: Mutex<HashMap<NegotiationId, Session>>,
}

struct Session {
    /// Handlers of the parties involved, by party name.
    parties: HashMap<String, Arc<dyn NegotiationHandler>>,
    /// Latest offer.
    offer: ContractOffer,
    /// Incremented on every counter-offer; stale responders and timers carry an older round.
    round: u64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let first_id = rand::thread_rng().gen_range(1..1_000_000);
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicI64::new(first_id),
                listeners: Mutex::new(HashMap::new()),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of negotiations still open.
    pub fn open_negotiations(&self) -> usize {
        self.inner.sessions.lock().len()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NegotiationTransport for LoopbackTransport {
    async fn offer(
        &self,
        offer: ContractOffer,
        handler: Arc<dyn NegotiationHandler>,
    ) -> NegotiatorResult<NegotiationId> {
        check_offer(&offer)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Session {
            parties: HashMap::from([(offer.offeror_name.clone(), handler)]),
            offer,
            round: 0,
        };
        self.inner.sessions.lock().insert(id, session);
        tracing::debug!("Loopback negotiation {} opened", id);

        Inner::dispatch(&self.inner, id, 0);
        Ok(id)
    }

    async fn listen(
        &self,
        party: &str,
        handler: Arc<dyn NegotiationHandler>,
    ) -> NegotiatorResult<()> {
        if self
            .inner
            .listeners
            .lock()
            .insert(party.to_string(), handler)
            .is_some()
        {
            tracing::warn!("Replaced loopback listener for {}", party);
        }
        Ok(())
    }
}

fn check_offer(offer: &ContractOffer) -> NegotiatorResult<()> {
    if offer.valid_until <= offer.valid_after {
        return Err(NegotiatorError::Protocol(format!(
            "offer validity window is empty ({} to {})",
            offer.valid_after, offer.valid_until
        )));
    }
    if offer.contracts.is_empty() {
        return Err(NegotiatorError::Protocol("offer without contracts".to_string()));
    }
    Ok(())
}

impl Inner {
    /// Deliver the latest offer of `id` to its receiver and arm its expiry timer.
    fn dispatch(this: &Arc<Self>, id: NegotiationId, round: u64) {
        let inner = Arc::clone(this);
        tokio::spawn(async move { inner.deliver_offer(id, round) });

        let valid_until = match this.sessions.lock().get(&id) {
            Some(session) => session.offer.valid_until,
            None => return,
        };
        let delay = (valid_until - Utc::now()).to_std().unwrap_or_default();
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.expire(id, round);
        });
    }

    fn deliver_offer(self: Arc<Self>, id: NegotiationId, round: u64) {
        let delivery = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(&id) else {
                return;
            };
            if session.round != round {
                return;
            }

            let receiver = session.offer.receiver_name.clone();
            let handler = session
                .parties
                .get(&receiver)
                .cloned()
                .or_else(|| self.listeners.lock().get(&receiver).cloned());

            match handler {
                Some(handler) => {
                    session.parties.insert(receiver, Arc::clone(&handler));
                    Ok((handler, session.offer.clone()))
                }
                None => {
                    let offeror = session.parties.get(&session.offer.offeror_name).cloned();
                    sessions.remove(&id);
                    Err((offeror, receiver))
                }
            }
        };

        match delivery {
            Ok((handler, offer)) => {
                let responder = LoopbackResponder {
                    inner: Arc::clone(&self),
                    id,
                    round,
                };
                handler.on_offer(Negotiation { id, offer }, Box::new(responder));
            }
            Err((offeror, receiver)) => {
                tracing::warn!("Negotiation {}: no party named {} is listening", id, receiver);
                if let Some(offeror) = offeror {
                    offeror.on_fault(
                        id,
                        NegotiatorError::Transport(format!("no party named {} is listening", receiver)),
                    );
                }
            }
        }
    }

    fn expire(&self, id: NegotiationId, round: u64) {
        let handlers: Vec<_> = {
            let mut sessions = self.sessions.lock();
            if sessions.get(&id).map(|s| s.round) != Some(round) {
                return;
            }
            match sessions.remove(&id) {
                Some(session) => session.parties.into_values().collect(),
                None => return,
            }
        };

        tracing::debug!("Loopback negotiation {} expired in round {}", id, round);
        for handler in handlers {
            handler.on_expiry(id);
        }
    }

    /// Close the round answered by a responder, returning the offeror's handler
    /// and the negotiation as it stood.
    fn close_round(
        &self,
        id: NegotiationId,
        round: u64,
    ) -> NegotiatorResult<(Arc<dyn NegotiationHandler>, Negotiation)> {
        let mut sessions = self.sessions.lock();
        open_session(&mut sessions, id, round)?;
        let session = sessions
            .remove(&id)
            .ok_or_else(|| NegotiatorError::Transport(format!("negotiation {} does not exist", id)))?;

        let offeror = session
            .parties
            .get(&session.offer.offeror_name)
            .cloned()
            .ok_or_else(|| NegotiatorError::Protocol(format!("negotiation {} lost its offeror", id)))?;
        Ok((
            offeror,
            Negotiation {
                id,
                offer: session.offer.clone(),
            },
        ))
    }
}

fn open_session(
    sessions: &mut HashMap<NegotiationId, Session>,
    id: NegotiationId,
    round: u64,
) -> NegotiatorResult<&mut Session> {
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| NegotiatorError::Transport(format!("negotiation {} does not exist", id)))?;
    if session.round != round || !session.offer.is_valid_at(Utc::now()) {
        return Err(NegotiatorError::Transport(format!(
            "offer in negotiation {} is no longer open",
            id
        )));
    }
    Ok(session)
}

/// Responds to one round of a loopback negotiation.
struct LoopbackResponder {
    inner: Arc<Inner>,
    id: NegotiationId,
    round: u64,
}

#[async_trait]
impl OfferResponder for LoopbackResponder {
    fn negotiation_id(&self) -> NegotiationId {
        self.id
    }

    async fn accept(self: Box<Self>) -> NegotiatorResult<()> {
        let (offeror, negotiation) = self.inner.close_round(self.id, self.round)?;
        tokio::spawn(async move { offeror.on_accept(negotiation) });
        Ok(())
    }

    async fn counter(self: Box<Self>, offer: ContractOffer) -> NegotiatorResult<()> {
        check_offer(&offer)?;
        let round = {
            let mut sessions = self.inner.sessions.lock();
            let session = open_session(&mut sessions, self.id, self.round)?;
            if offer.offeror_name != session.offer.receiver_name
                || offer.receiver_name != session.offer.offeror_name
            {
                return Err(NegotiatorError::Protocol(format!(
                    "counter-offer in negotiation {} must go from {} to {}",
                    self.id, session.offer.receiver_name, session.offer.offeror_name
                )));
            }
            session.round += 1;
            session.offer = offer;
            session.round
        };

        Inner::dispatch(&self.inner, self.id, round);
        Ok(())
    }

    async fn reject(self: Box<Self>) -> NegotiatorResult<()> {
        let (offeror, negotiation) = self.inner.close_round(self.id, self.round)?;
        tokio::spawn(async move { offeror.on_reject(negotiation) });
        Ok(())
    }
}

/// Party that accepts every offer it receives.
pub struct AcceptingParty {
    name: String,
}

impl AcceptingParty {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl NegotiationHandler for AcceptingParty {
    fn on_accept(&self, negotiation: Negotiation) {
        tracing::info!("{}: offer {} accepted", self.name, negotiation.id);
    }

    fn on_offer(&self, negotiation: Negotiation, responder: Box<dyn OfferResponder>) {
        let name = self.name.clone();
        tokio::spawn(async move {
            match responder.accept().await {
                Ok(()) => tracing::info!("{}: accepted offer {}", name, negotiation.id),
                Err(e) => tracing::warn!("{}: could not accept offer {}: {}", name, negotiation.id, e),
            }
        });
    }

    fn on_reject(&self, negotiation: Negotiation) {
        tracing::info!("{}: offer {} rejected", self.name, negotiation.id);
    }

    fn on_expiry(&self, id: NegotiationId) {
        tracing::info!("{}: offer {} expired", self.name, id);
    }

    fn on_fault(&self, id: NegotiationId, error: NegotiatorError) {
        tracing::warn!("{}: negotiation {} faulted: {}", self.name, id, error);
    }
}
