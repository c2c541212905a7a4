//! Negotiator client SDK: drive negotiations and poll the inbox over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use negotiator_client::NegotiatorClient;
//! use negotiator_core::TrustedContract;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = NegotiatorClient::new("http://127.0.0.1:9000");
//!
//!     let id = client
//!         .submit_offer("seller", vec![TrustedContract::new("purchase.txt")])
//!         .await?;
//!     println!("Negotiation {}", id);
//!
//!     for entry in client.poll().await? {
//!         println!("{:?} {}", entry.kind(), entry.wire_negotiation_id());
//!     }
//!
//!     Ok(())
//! }
//! ```

use serde::Serialize;

use negotiator_core::{
    CounterOfferRequest, ErrorBody, ErrorCode, InboxEntry, NegotiationId, NegotiationRef,
    NegotiationStatus, NegotiatorError, NegotiatorResult, OfferCreated, OfferRequest,
    TrustedContract,
};

/// HTTP client for one negotiator, remembering how far the inbox was read.
#[derive(Debug, Clone)]
pub struct NegotiatorClient {
    http: reqwest::Client,
    base_url: String,
    offset: usize,
}

impl NegotiatorClient {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client using a pre-configured `reqwest::Client`.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            offset: 0,
        }
    }

    /// Offset of the next inbox entry [`poll`](Self::poll) will return.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Continue polling from `offset`.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Offer `terms` to `receiver`, returning the new negotiation's id.
    pub async fn submit_offer(
        &self,
        receiver: impl Into<String>,
        terms: Vec<TrustedContract>,
    ) -> NegotiatorResult<NegotiationId> {
        let response = self
            .post("offers", &OfferRequest::new(receiver, terms), None)
            .await?;
        let created: OfferCreated = response
            .json()
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Invalid offer response: {}", e)))?;
        Ok(created.id)
    }

    pub async fn accept(&self, id: NegotiationId) -> NegotiatorResult<()> {
        self.post("acceptances", &NegotiationRef::new(id), Some(id))
            .await
            .map(drop)
    }

    pub async fn counter(&self, id: NegotiationId, terms: Vec<TrustedContract>) -> NegotiatorResult<()> {
        self.post("counter-offers", &CounterOfferRequest::new(id, terms), Some(id))
            .await
            .map(drop)
    }

    pub async fn reject(&self, id: NegotiationId) -> NegotiatorResult<()> {
        self.post("rejections", &NegotiationRef::new(id), Some(id))
            .await
            .map(drop)
    }

    /// Inbox entries from `offset` on, without moving the poll position.
    pub async fn entries_from(&self, offset: usize) -> NegotiatorResult<Vec<InboxEntry>> {
        let response = self
            .http
            .get(self.url("inbox/entries"))
            .query(&[("from", offset)])
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response, None).await?;

        response
            .json()
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Invalid inbox response: {}", e)))
    }

    /// Inbox entries not yet returned by an earlier poll.
    pub async fn poll(&mut self) -> NegotiatorResult<Vec<InboxEntry>> {
        let entries = self.entries_from(self.offset).await?;
        self.offset += entries.len();
        if !entries.is_empty() {
            tracing::debug!("Polled {} entries, next offset {}", entries.len(), self.offset);
        }
        Ok(entries)
    }

    pub async fn negotiation_status(&self, id: NegotiationId) -> NegotiatorResult<NegotiationStatus> {
        let response = self
            .http
            .get(self.url(&format!("negotiations/{}", id)))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response, Some(id)).await?;

        response
            .json()
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Invalid status response: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        id: Option<NegotiationId>,
    ) -> NegotiatorResult<reqwest::Response> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check(response, id).await
    }
}

fn transport_error(e: reqwest::Error) -> NegotiatorError {
    NegotiatorError::Transport(format!("Request failed: {}", e))
}

/// Turn an error response back into the error the server reported.
async fn check(
    response: reqwest::Response,
    id: Option<NegotiationId>,
) -> NegotiatorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body,
        Err(_) => {
            return Err(NegotiatorError::Transport(format!(
                "Negotiator responded with {}: {}",
                status, text
            )))
        }
    };

    Err(match (body.error.code, id) {
        (ErrorCode::UnknownNegotiation, Some(id)) => NegotiatorError::UnknownNegotiation(id),
        (ErrorCode::MalformedRequest, _) => NegotiatorError::MalformedRequest(body.error.message),
        (ErrorCode::TransportFailure, _) => NegotiatorError::Transport(body.error.message),
        _ => NegotiatorError::Protocol(body.error.message),
    })
}
