//! Negotiator server: represents one trading party in contract negotiations.
//!
//! Transport callbacks are turned into an inbox that clients poll over HTTP,
//! enriched with definition documents looked up by negotiation id or by the
//! content hashes referenced in offers.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod definitions;
pub mod handler;
pub mod loopback;
pub mod server;
pub mod state_machine;
pub mod transport;

pub use api::NegotiationApi;
pub use config::ServerConfig;
pub use coordinator::NegotiationCoordinator;
pub use definitions::{DefinitionFetcher, DefinitionSource, HttpDefinitionSource};
pub use handler::{create_routes, ApiError};
pub use loopback::{AcceptingParty, LoopbackTransport};
pub use server::Server;
pub use state_machine::NegotiationTracker;
pub use transport::{NegotiationHandler, NegotiationTransport, OfferResponder};
