//! Request and response bodies of the negotiator HTTP API.
//!
//! Required fields are optional here so a missing field is reported as a
//! malformed request instead of a decoding failure.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, NegotiatorError, NegotiatorResult};
use crate::offer::{NegotiationId, TrustedContract};
use crate::state::NegotiationState;

/// `POST /offers` body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default)]
    pub terms: Vec<TrustedContract>,
}

impl OfferRequest {
    pub fn new(receiver: impl Into<String>, terms: Vec<TrustedContract>) -> Self {
        Self {
            receiver: Some(receiver.into()),
            terms,
        }
    }

    /// Receiver and terms, if both are present.
    pub fn validate(self) -> NegotiatorResult<(String, Vec<TrustedContract>)> {
        let receiver = self
            .receiver
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| NegotiatorError::MalformedRequest("missing receiver".to_string()))?;
        Ok((receiver, require_terms(self.terms)?))
    }
}

/// `POST /acceptances` and `POST /rejections` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NegotiationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NegotiationId>,
}

impl NegotiationRef {
    pub fn new(id: NegotiationId) -> Self {
        Self { id: Some(id) }
    }

    pub fn validate(self) -> NegotiatorResult<NegotiationId> {
        self.id
            .ok_or_else(|| NegotiatorError::MalformedRequest("missing id".to_string()))
    }
}

/// `POST /counter-offers` body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation_id: Option<NegotiationId>,
    #[serde(default)]
    pub terms: Vec<TrustedContract>,
}

impl CounterOfferRequest {
    pub fn new(negotiation_id: NegotiationId, terms: Vec<TrustedContract>) -> Self {
        Self {
            negotiation_id: Some(negotiation_id),
            terms,
        }
    }

    pub fn validate(self) -> NegotiatorResult<(NegotiationId, Vec<TrustedContract>)> {
        let id = self
            .negotiation_id
            .ok_or_else(|| NegotiatorError::MalformedRequest("missing negotiationId".to_string()))?;
        Ok((id, require_terms(self.terms)?))
    }
}

fn require_terms(terms: Vec<TrustedContract>) -> NegotiatorResult<Vec<TrustedContract>> {
    if terms.is_empty() {
        return Err(NegotiatorError::MalformedRequest(
            "terms must name at least one contract".to_string(),
        ));
    }
    if terms.iter().any(|t| t.template_name.trim().is_empty()) {
        return Err(NegotiatorError::MalformedRequest(
            "contract without template name".to_string(),
        ));
    }
    Ok(terms)
}

/// `POST /offers` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    pub id: NegotiationId,
}

/// `GET /negotiations/:id` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationStatus {
    pub id: NegotiationId,
    pub state: NegotiationState,
}

/// Error response body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&NegotiatorError> for ErrorBody {
    fn from(error: &NegotiatorError) -> Self {
        Self {
            error: ErrorDetail {
                code: error.code(),
                message: error.to_string(),
            },
        }
    }
}
