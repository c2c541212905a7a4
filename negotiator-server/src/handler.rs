//! HTTP routes exposing the negotiation API.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use negotiator_core::{
    CounterOfferRequest, ErrorBody, InboxEntry, NegotiationId, NegotiationRef, NegotiationStatus,
    NegotiatorError, OfferCreated, OfferRequest,
};

use crate::api::NegotiationApi;

/// Error returned by route handlers.
#[derive(Debug)]
pub struct ApiError(pub NegotiatorError);

impl From<NegotiatorError> for ApiError {
    fn from(error: NegotiatorError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(NegotiatorError::MalformedRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(NegotiatorError::MalformedRequest(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(NegotiatorError::MalformedRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NegotiatorError::UnknownNegotiation(_) | NegotiatorError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            NegotiatorError::Transport(_) => StatusCode::BAD_GATEWAY,
            NegotiatorError::Serialization(_) => StatusCode::BAD_REQUEST,
            NegotiatorError::Protocol(_) | NegotiatorError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request refused: {}", self.0);
        }

        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Decode a JSON object body into `T`, reporting anything else as malformed.
fn parse_body<T: DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> ApiResult<T> {
    let Json(value) = body?;
    if !value.is_object() {
        return Err(ApiError(NegotiatorError::MalformedRequest(
            "request body must be a JSON object".to_string(),
        )));
    }
    serde_json::from_value(value)
        .map_err(|e| ApiError(NegotiatorError::MalformedRequest(e.to_string())))
}

#[derive(Debug, Deserialize)]
struct InboxQuery {
    #[serde(default)]
    from: usize,
}

/// Create all negotiation routes.
pub fn create_routes(api: NegotiationApi) -> Router {
    Router::new()
        .route("/offers", post(submit_offer))
        .route("/acceptances", post(accept_offer))
        .route("/counter-offers", post(counter_offer))
        .route("/rejections", post(reject_offer))
        .route("/inbox/entries", get(inbox_entries))
        .route("/negotiations/:id", get(negotiation_status))
        .with_state(api)
}

async fn submit_offer(
    State(api): State<NegotiationApi>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<OfferCreated>> {
    let request: OfferRequest = parse_body(body)?;
    Ok(Json(api.submit_offer(request).await?))
}

async fn accept_offer(
    State(api): State<NegotiationApi>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let request: NegotiationRef = parse_body(body)?;
    api.accept_offer(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn counter_offer(
    State(api): State<NegotiationApi>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let request: CounterOfferRequest = parse_body(body)?;
    api.counter_offer(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reject_offer(
    State(api): State<NegotiationApi>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let request: NegotiationRef = parse_body(body)?;
    api.reject_offer(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn inbox_entries(
    State(api): State<NegotiationApi>,
    query: Result<Query<InboxQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<InboxEntry>>> {
    let Query(query) = query?;
    Ok(Json(api.inbox_entries(query.from)))
}

async fn negotiation_status(
    State(api): State<NegotiationApi>,
    id: Result<Path<NegotiationId>, PathRejection>,
) -> Result<Json<NegotiationStatus>, Response> {
    let Path(id) = id.map_err(|e| ApiError::from(e).into_response())?;
    api.negotiation_status(id).map(Json).map_err(|e| {
        (StatusCode::NOT_FOUND, Json(ErrorBody::from(&e))).into_response()
    })
}
