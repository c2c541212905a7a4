//! Inbox entries and the append-only inbox log polled by clients.
//!
//! Entries are addressed by dense offsets starting at zero. A client keeps the
//! offset of the next entry it has not yet seen and asks for everything from
//! there on; entries are never removed or reordered, so re-reading from the
//! same offset is always safe.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NegotiatorError, NegotiatorResult};
use crate::offer::{ContractOffer, Negotiation, NegotiationId};

/// Kind of an inbox entry, as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    OfferSubmitted,
    OfferAccepted,
    OfferRejected,
    OfferExpired,
    OfferFaulted,
    DefinitionFound,
}

/// How a definition document was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiscoveryMode {
    /// Direct lookup by negotiation id.
    ById,
    /// Lookup by content hashes referenced in an offer's arguments.
    ByHash,
}

/// What happened, with the payload that belongs to it.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxEvent {
    /// A counterparty made us an offer we may respond to.
    OfferSubmitted(ContractOffer),
    OfferAccepted(ContractOffer),
    OfferRejected(ContractOffer),
    OfferExpired,
    OfferFaulted { error: String },
    DefinitionFound {
        mode: DiscoveryMode,
        definition: Value,
    },
}

/// One immutable fact in the inbox.
///
/// `negotiation_id` is always the id of the source negotiation. On the wire a
/// definition found by hash is reported with the id negated; conversion
/// happens only during (de)serialization. Definition entries only exist for
/// positive ids, which keeps that encoding reversible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEntry", try_from = "WireEntry")]
pub struct InboxEntry {
    negotiation_id: NegotiationId,
    event: InboxEvent,
}

impl InboxEntry {
    pub fn offer_submitted(negotiation: &Negotiation) -> Self {
        Self {
            negotiation_id: negotiation.id,
            event: InboxEvent::OfferSubmitted(negotiation.offer.clone()),
        }
    }

    pub fn offer_accepted(negotiation: &Negotiation) -> Self {
        Self {
            negotiation_id: negotiation.id,
            event: InboxEvent::OfferAccepted(negotiation.offer.clone()),
        }
    }

    pub fn offer_rejected(negotiation: &Negotiation) -> Self {
        Self {
            negotiation_id: negotiation.id,
            event: InboxEvent::OfferRejected(negotiation.offer.clone()),
        }
    }

    pub fn offer_expired(id: NegotiationId) -> Self {
        Self {
            negotiation_id: id,
            event: InboxEvent::OfferExpired,
        }
    }

    pub fn offer_faulted(id: NegotiationId, error: impl Into<String>) -> Self {
        Self {
            negotiation_id: id,
            event: InboxEvent::OfferFaulted {
                error: error.into(),
            },
        }
    }

    /// A definition discovered for negotiation `id`. Fails unless `id` is positive.
    pub fn definition_found(
        id: NegotiationId,
        mode: DiscoveryMode,
        definition: Value,
    ) -> NegotiatorResult<Self> {
        if id <= 0 {
            return Err(NegotiatorError::Protocol(format!(
                "definitions cannot be reported for negotiation id {}",
                id
            )));
        }
        Ok(Self {
            negotiation_id: id,
            event: InboxEvent::DefinitionFound { mode, definition },
        })
    }

    /// Id of the source negotiation.
    pub fn negotiation_id(&self) -> NegotiationId {
        self.negotiation_id
    }

    pub fn event(&self) -> &InboxEvent {
        &self.event
    }

    pub fn kind(&self) -> EntryKind {
        match self.event {
            InboxEvent::OfferSubmitted(_) => EntryKind::OfferSubmitted,
            InboxEvent::OfferAccepted(_) => EntryKind::OfferAccepted,
            InboxEvent::OfferRejected(_) => EntryKind::OfferRejected,
            InboxEvent::OfferExpired => EntryKind::OfferExpired,
            InboxEvent::OfferFaulted { .. } => EntryKind::OfferFaulted,
            InboxEvent::DefinitionFound { .. } => EntryKind::DefinitionFound,
        }
    }

    /// The id as reported on the wire: negated for definitions found by hash.
    pub fn wire_negotiation_id(&self) -> NegotiationId {
        match self.event {
            InboxEvent::DefinitionFound {
                mode: DiscoveryMode::ByHash,
                ..
            } => -self.negotiation_id, // positive, see `definition_found`
            _ => self.negotiation_id,
        }
    }

    pub fn offer(&self) -> Option<&ContractOffer> {
        match &self.event {
            InboxEvent::OfferSubmitted(offer)
            | InboxEvent::OfferAccepted(offer)
            | InboxEvent::OfferRejected(offer) => Some(offer),
            _ => None,
        }
    }

    pub fn definition(&self) -> Option<&Value> {
        match &self.event {
            InboxEvent::DefinitionFound { definition, .. } => Some(definition),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.event {
            InboxEvent::OfferFaulted { error } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    kind: EntryKind,
    negotiation_id: NegotiationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offer: Option<ContractOffer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    definition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<InboxEntry> for WireEntry {
    fn from(entry: InboxEntry) -> Self {
        let kind = entry.kind();
        let negotiation_id = entry.wire_negotiation_id();
        let mut wire = WireEntry {
            kind,
            negotiation_id,
            offer: None,
            definition: None,
            error: None,
        };
        match entry.event {
            InboxEvent::OfferSubmitted(offer)
            | InboxEvent::OfferAccepted(offer)
            | InboxEvent::OfferRejected(offer) => wire.offer = Some(offer),
            InboxEvent::OfferExpired => {}
            InboxEvent::OfferFaulted { error } => wire.error = Some(error),
            InboxEvent::DefinitionFound { definition, .. } => wire.definition = Some(definition),
        }
        wire
    }
}

impl TryFrom<WireEntry> for InboxEntry {
    type Error = NegotiatorError;

    fn try_from(wire: WireEntry) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            NegotiatorError::MalformedRequest(format!("{:?} entry without {}", wire.kind, field))
        };

        let (negotiation_id, event) = match wire.kind {
            EntryKind::OfferSubmitted => (
                wire.negotiation_id,
                InboxEvent::OfferSubmitted(wire.offer.clone().ok_or_else(|| missing("offer"))?),
            ),
            EntryKind::OfferAccepted => (
                wire.negotiation_id,
                InboxEvent::OfferAccepted(wire.offer.clone().ok_or_else(|| missing("offer"))?),
            ),
            EntryKind::OfferRejected => (
                wire.negotiation_id,
                InboxEvent::OfferRejected(wire.offer.clone().ok_or_else(|| missing("offer"))?),
            ),
            EntryKind::OfferExpired => (wire.negotiation_id, InboxEvent::OfferExpired),
            EntryKind::OfferFaulted => (
                wire.negotiation_id,
                InboxEvent::OfferFaulted {
                    error: wire.error.clone().ok_or_else(|| missing("error"))?,
                },
            ),
            EntryKind::DefinitionFound => {
                let definition = wire.definition.clone().ok_or_else(|| missing("definition"))?;
                let (id, mode) = if wire.negotiation_id < 0 {
                    let id = wire.negotiation_id.checked_neg().ok_or_else(|| {
                        NegotiatorError::MalformedRequest(format!(
                            "negotiation id {} out of range",
                            wire.negotiation_id
                        ))
                    })?;
                    (id, DiscoveryMode::ByHash)
                } else {
                    (wire.negotiation_id, DiscoveryMode::ById)
                };
                return InboxEntry::definition_found(id, mode, definition)
                    .map_err(|e| NegotiatorError::MalformedRequest(e.to_string()));
            }
        };

        Ok(InboxEntry {
            negotiation_id,
            event,
        })
    }
}

/// Append-only log of inbox entries.
#[derive(Debug, Default)]
pub struct InboxLog {
    entries: RwLock<Vec<InboxEntry>>,
}

impl InboxLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its offset.
    ///
    /// The offset is assigned while holding the write lock, so concurrent
    /// appenders are totally ordered by completion.
    pub fn append(&self, entry: InboxEntry) -> usize {
        let mut entries = self.entries.write();
        let offset = entries.len();
        tracing::debug!(
            "Inbox entry {}: {:?} for negotiation {}",
            offset,
            entry.kind(),
            entry.wire_negotiation_id()
        );
        entries.push(entry);
        offset
    }

    /// All entries at position `offset` and later, in append order.
    ///
    /// Offsets past the end yield an empty list.
    pub fn read_from(&self, offset: usize) -> Vec<InboxEntry> {
        let entries = self.entries.read();
        entries.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Grouping key for definition entries: source negotiation and how it was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionKey {
    pub negotiation_id: NegotiationId,
    pub mode: DiscoveryMode,
}

/// Group the definitions in `entries` by source negotiation and discovery mode.
///
/// By-id and by-hash lookups for the same offer may interleave in the log, so
/// arrival order is not meaningful; this grouping is.
pub fn group_definitions<'a, I>(entries: I) -> BTreeMap<DefinitionKey, Vec<&'a Value>>
where
    I: IntoIterator<Item = &'a InboxEntry>,
{
    let mut groups: BTreeMap<DefinitionKey, Vec<&Value>> = BTreeMap::new();
    for entry in entries {
        if let InboxEvent::DefinitionFound { mode, definition } = &entry.event {
            groups
                .entry(DefinitionKey {
                    negotiation_id: entry.negotiation_id,
                    mode: *mode,
                })
                .or_default()
                .push(definition);
        }
    }
    groups
}
