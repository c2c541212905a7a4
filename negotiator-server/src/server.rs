//! Service assembly: transport, coordinator, enrichment and HTTP listener.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use negotiator_core::{NegotiatorError, NegotiatorResult};

use crate::api::NegotiationApi;
use crate::config::ServerConfig;
use crate::coordinator::NegotiationCoordinator;
use crate::definitions::HttpDefinitionSource;
use crate::handler::create_routes;
use crate::loopback::{AcceptingParty, LoopbackTransport};
use crate::transport::NegotiationTransport;

/// Negotiator server.
pub struct Server {
    config: ServerConfig,
    api: NegotiationApi,
}

impl Server {
    /// Create a server negotiating over the in-process loopback transport.
    pub async fn new(config: ServerConfig) -> NegotiatorResult<Self> {
        let transport = Arc::new(LoopbackTransport::new());
        if let Some(peer) = &config.demo_peer {
            transport
                .listen(peer, Arc::new(AcceptingParty::new(peer.clone())))
                .await?;
            tracing::info!("Demo peer {} accepts every offer", peer);
        }
        Self::with_transport(config, transport).await
    }

    /// Create a server negotiating over `transport`.
    pub async fn with_transport(
        config: ServerConfig,
        transport: Arc<dyn NegotiationTransport>,
    ) -> NegotiatorResult<Self> {
        config.validate()?;

        let mut coordinator = NegotiationCoordinator::new(transport);
        if let Some(url) = &config.definitions_url {
            let source = HttpDefinitionSource::new(url, config.lookup_timeout)?;
            coordinator = coordinator.with_definitions(Arc::new(source), Handle::current());
            tracing::info!("Definitions looked up at {}", url);
        } else {
            tracing::info!("No definitions service configured; inbox is not enriched");
        }

        let coordinator = Arc::new(coordinator);
        coordinator.listen(&config.party).await?;

        let api = NegotiationApi::new(coordinator, config.party.clone(), config.offer_validity()?);
        Ok(Self { config, api })
    }

    pub fn api(&self) -> &NegotiationApi {
        &self.api
    }

    /// HTTP routes of this server.
    pub fn router(&self) -> Router {
        create_routes(self.api.clone())
    }

    /// Serve on the configured address until Ctrl-C.
    pub async fn run(self) -> NegotiatorResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Failed to bind: {}", e)))?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` completes, then wait for
    /// outstanding definition lookups.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> NegotiatorResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| NegotiatorError::Transport(format!("Listener has no address: {}", e)))?;
        tracing::info!("Negotiator for {} listening on http://{}", self.config.party, local_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Server error: {}", e)))?;

        tracing::info!("Shutting down; waiting for definition lookups");
        self.api.coordinator().settle().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
