//! Registry of pending response capabilities, keyed by negotiation id.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{NegotiatorError, NegotiatorResult};
use crate::offer::NegotiationId;

/// Concurrent map from negotiation id to a one-shot response capability.
///
/// A capability can only leave the registry through [`take`](Self::take),
/// which removes it atomically, so at most one caller ever gets to act on a
/// given offer.
pub struct ResponderRegistry<R> {
    responders: Mutex<HashMap<NegotiationId, R>>,
}

impl<R> ResponderRegistry<R> {
    pub fn new() -> Self {
        Self {
            responders: Mutex::new(HashMap::new()),
        }
    }

    /// Register the capability for `id`.
    ///
    /// If a capability was already registered it is returned without any of
    /// its actions having been invoked; the caller decides how to retire it.
    #[must_use = "a displaced responder must be explicitly retired"]
    pub fn put(&self, id: NegotiationId, responder: R) -> Option<R> {
        self.responders.lock().insert(id, responder)
    }

    /// Remove and return the capability for `id`.
    pub fn take(&self, id: NegotiationId) -> NegotiatorResult<R> {
        self.responders
            .lock()
            .remove(&id)
            .ok_or(NegotiatorError::UnknownNegotiation(id))
    }

    /// Remove the capability for `id`, if any, without reporting absence.
    pub fn discard(&self, id: NegotiationId) -> Option<R> {
        self.responders.lock().remove(&id)
    }

    pub fn contains(&self, id: NegotiationId) -> bool {
        self.responders.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.responders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.lock().is_empty()
    }

    /// Ids with a capability awaiting use, in ascending order.
    pub fn pending_ids(&self) -> Vec<NegotiationId> {
        let mut ids: Vec<_> = self.responders.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<R> Default for ResponderRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_and_take() {
        let registry = ResponderRegistry::new();
        assert!(registry.put(1, "first").is_none());
        assert!(registry.contains(1));

        assert_eq!(registry.take(1).unwrap(), "first");
        assert!(!registry.contains(1));
        assert!(matches!(
            registry.take(1),
            Err(NegotiatorError::UnknownNegotiation(1))
        ));
    }

    #[test]
    fn put_returns_displaced_responder() {
        let registry = ResponderRegistry::new();
        assert!(registry.put(5, "old").is_none());
        assert_eq!(registry.put(5, "new"), Some("old"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.take(5).unwrap(), "new");
        assert!(registry.is_empty());
    }

    #[test]
    fn discard_and_pending_ids() {
        let registry = ResponderRegistry::new();
        let _ = registry.put(3, ());
        let _ = registry.put(1, ());
        let _ = registry.put(2, ());
        assert_eq!(registry.pending_ids(), vec![1, 2, 3]);

        assert!(registry.discard(2).is_some());
        assert!(registry.discard(2).is_none());
        assert_eq!(registry.pending_ids(), vec![1, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_take_has_one_winner() {
        for round in 0..50 {
            let registry = Arc::new(ResponderRegistry::new());
            let _ = registry.put(round, round);

            let a = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.take(round) })
            };
            let b = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.take(round) })
            };

            let results = [a.await.unwrap(), b.await.unwrap()];
            let winners = results.iter().filter(|r| r.is_ok()).count();
            let losers = results
                .iter()
                .filter(|r| matches!(r, Err(NegotiatorError::UnknownNegotiation(_))))
                .count();
            assert_eq!((winners, losers), (1, 1));
        }
    }
}
