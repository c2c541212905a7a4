//! Server configuration for the negotiator.

use std::net::SocketAddr;
use std::time::Duration;

use negotiator_core::{NegotiatorError, NegotiatorResult};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: SocketAddr,
    /// Name of the party this negotiator represents.
    pub party: String,
    /// Validity window of offers and counter-offers we make.
    pub offer_validity: Duration,
    /// Base URL of the definitions service; enrichment is off without one.
    pub definitions_url: Option<String>,
    /// Timeout of a single definitions lookup.
    pub lookup_timeout: Duration,
    /// Name of an in-process counterparty that accepts every offer.
    pub demo_peer: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            party: "negotiator".to_string(),
            offer_validity: Duration::from_secs(3 * 60),
            definitions_url: None,
            lookup_timeout: Duration::from_secs(10),
            demo_peer: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address.
    pub fn with_addr(addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }

    /// Read configuration from `NEGOTIATOR_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> NegotiatorResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> NegotiatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("NEGOTIATOR_BIND") {
            config.bind_addr = parse_addr(&addr)?;
        }
        if let Some(party) = lookup("NEGOTIATOR_PARTY") {
            config = config.with_party(party);
        }
        if let Some(url) = lookup("NEGOTIATOR_DEFINITIONS_URL") {
            config = config.with_definitions_url(url);
        }
        if let Some(secs) = lookup("NEGOTIATOR_OFFER_VALIDITY_SECS") {
            config.offer_validity = parse_secs("NEGOTIATOR_OFFER_VALIDITY_SECS", &secs)?;
        }
        if let Some(secs) = lookup("NEGOTIATOR_LOOKUP_TIMEOUT_SECS") {
            config.lookup_timeout = parse_secs("NEGOTIATOR_LOOKUP_TIMEOUT_SECS", &secs)?;
        }
        if let Some(peer) = lookup("NEGOTIATOR_DEMO_PEER") {
            config = config.with_demo_peer(peer);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the party name.
    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.party = party.into();
        self
    }

    /// Enable definition lookups against `url`.
    pub fn with_definitions_url(mut self, url: impl Into<String>) -> Self {
        self.definitions_url = Some(url.into());
        self
    }

    /// Set the validity window of offers we make.
    pub fn with_offer_validity(mut self, validity: Duration) -> Self {
        self.offer_validity = validity;
        self
    }

    /// Register an in-process counterparty named `peer`.
    pub fn with_demo_peer(mut self, peer: impl Into<String>) -> Self {
        self.demo_peer = Some(peer.into());
        self
    }

    /// Offer validity as a calendar duration.
    pub fn offer_validity(&self) -> NegotiatorResult<chrono::Duration> {
        chrono::Duration::from_std(self.offer_validity)
            .map_err(|e| NegotiatorError::Config(format!("offer validity out of range: {}", e)))
    }

    /// Check values that cannot be expressed by the types alone.
    pub fn validate(&self) -> NegotiatorResult<()> {
        if self.party.trim().is_empty() {
            return Err(NegotiatorError::Config("party name is empty".to_string()));
        }
        if self.offer_validity.is_zero() {
            return Err(NegotiatorError::Config("offer validity must be positive".to_string()));
        }
        if self.demo_peer.as_deref() == Some(self.party.as_str()) {
            return Err(NegotiatorError::Config(
                "demo peer must differ from the party name".to_string(),
            ));
        }
        self.offer_validity()?;
        Ok(())
    }
}

/// Parse a socket address given on the command line or in the environment.
pub fn parse_addr(value: &str) -> NegotiatorResult<SocketAddr> {
    value
        .parse()
        .map_err(|e| NegotiatorError::Config(format!("invalid bind address '{}': {}", value, e)))
}

fn parse_secs(name: &str, value: &str) -> NegotiatorResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| NegotiatorError::Config(format!("{} is not a number of seconds: {}", name, e)))
}
