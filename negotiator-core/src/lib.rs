//! # negotiator-core
//!
//! Core library for a contract negotiation client.
//!
//! This crate provides the offer and inbox data model, the HTTP API bodies,
//! the append-only inbox log polled by clients, the registry of pending
//! response capabilities and the negotiation state automaton.

pub mod error;
pub mod inbox;
pub mod message;
pub mod offer;
pub mod responder;
pub mod state;

pub use error::{ErrorCode, NegotiatorError, NegotiatorResult};
pub use inbox::{
    group_definitions, DefinitionKey, DiscoveryMode, EntryKind, InboxEntry, InboxEvent, InboxLog,
};
pub use message::{
    CounterOfferRequest, ErrorBody, ErrorDetail, NegotiationRef, NegotiationStatus, OfferCreated,
    OfferRequest,
};
pub use offer::{
    collect_hash_tokens, ContractOffer, Negotiation, NegotiationId, TrustedContract, HASH_SUFFIX,
};
pub use responder::ResponderRegistry;
pub use state::{NegotiationEvent, NegotiationState};
