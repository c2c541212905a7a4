//! Negotiator server binary.

use negotiator_core::NegotiatorResult;
use negotiator_server::{config::parse_addr, Server, ServerConfig};

#[tokio::main]
async fn main() -> NegotiatorResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut config = ServerConfig::from_env()?;

    // First argument overrides the bind address
    if let Some(addr) = std::env::args().nth(1) {
        config.bind_addr = parse_addr(&addr)?;
    }

    tracing::info!(
        "Starting negotiator for {} on {} (offers valid for {:?})",
        config.party,
        config.bind_addr,
        config.offer_validity
    );

    let server = Server::new(config).await?;
    server.run().await
}
