//! Error types and client-visible error codes for the negotiator.

use thiserror::Error;

use crate::offer::NegotiationId;

/// Error codes reported to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Negotiation transport or definitions service unreachable or failing.
    TransportFailure,
    /// No response capability is registered for the referenced negotiation.
    UnknownNegotiation,
    /// Request payload is missing required fields.
    MalformedRequest,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportFailure => write!(f, "transport_failure"),
            Self::UnknownNegotiation => write!(f, "unknown_negotiation"),
            Self::MalformedRequest => write!(f, "malformed_request"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Negotiator errors.
#[derive(Debug, Error)]
pub enum NegotiatorError {
    /// External negotiation or definitions service failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No response capability registered, or it was already used.
    #[error("negotiation {0} is unknown or already resolved")]
    UnknownNegotiation(NegotiationId),

    /// Client payload missing required fields.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Protocol violation (invalid state transition, closed round).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NegotiatorError {
    /// Code reported to API clients for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportFailure,
            Self::UnknownNegotiation(_) => ErrorCode::UnknownNegotiation,
            Self::MalformedRequest(_) => ErrorCode::MalformedRequest,
            Self::Protocol(_) | Self::Config(_) | Self::Serialization(_) => ErrorCode::Internal,
        }
    }
}

/// Result type alias for negotiator operations.
pub type NegotiatorResult<T> = Result<T, NegotiatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_display() {
        assert_eq!(ErrorCode::TransportFailure.to_string(), "transport_failure");
        assert_eq!(ErrorCode::UnknownNegotiation.to_string(), "unknown_negotiation");
        assert_eq!(ErrorCode::MalformedRequest.to_string(), "malformed_request");
        assert_eq!(ErrorCode::Internal.to_string(), "internal");
    }

    #[test]
    fn error_code_serde() {
        let json = serde_json::to_string(&ErrorCode::UnknownNegotiation).unwrap();
        assert_eq!(json, "\"unknown_negotiation\"");

        let parsed: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ErrorCode::UnknownNegotiation);
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(
            NegotiatorError::UnknownNegotiation(7).code(),
            ErrorCode::UnknownNegotiation
        );
        assert_eq!(
            NegotiatorError::Transport("down".into()).code(),
            ErrorCode::TransportFailure
        );
        assert_eq!(
            NegotiatorError::Protocol("bad".into()).code(),
            ErrorCode::Internal
        );
        assert_eq!(
            NegotiatorError::UnknownNegotiation(7).to_string(),
            "negotiation 7 is unknown or already resolved"
        );
    }
}
