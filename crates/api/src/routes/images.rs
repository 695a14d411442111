//! Image saga endpoints.
//!
//! Each `POST` delivers one inbound message to the engine and answers with
//! the resulting transition; the outbound messages are published before the
//! response is sent.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CorrelationId, RequestId};
use contracts::{
    ImageNotFound, ImageRequestCompleted, ImageRetrievalFailed, ImageRetrieved, InboundMessage,
    OutboundMessage, RequestImage,
};
use saga::{Action, InMemoryPublisher, QueueActivityStrategy, SagaEngine, Transition};
use saga_store::{ImageSaga, SagaLookup, SagaRepository, SagaState};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R: SagaRepository> {
    pub engine: SagaEngine<R, QueueActivityStrategy>,
    pub publisher: InMemoryPublisher,
    /// Storage backend name reported by `/health`.
    pub storage: &'static str,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestImageBody {
    pub source_address: String,
    /// Assigned by the server when absent.
    pub request_id: Option<RequestId>,
    /// When the message was raised; the server clock when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRetrievedBody {
    pub source_address: String,
    pub local_address: String,
    pub content_type: String,
    pub content_length: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRetrievalFailedBody {
    pub source_address: String,
    pub reason: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNotFoundBody {
    pub source_address: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SourceQuery {
    pub source: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub correlation_id: CorrelationId,
    pub action: Action,
    pub from: SagaState,
    pub to: SagaState,
    pub response: Option<ImageRequestCompleted>,
    pub published: Vec<OutboundMessage>,
}

impl From<Transition> for TransitionResponse {
    fn from(transition: Transition) -> Self {
        Self {
            correlation_id: transition.correlation_id,
            action: transition.action,
            from: transition.from,
            to: transition.to,
            response: transition.response,
            published: transition.publish,
        }
    }
}

// -- Handlers --

/// POST /images/requests: a requester asks for a resource.
#[tracing::instrument(skip_all)]
pub async fn request<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<RequestImageBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let source_address = require_source(body.source_address)?;
    let message = RequestImage {
        request_id: body.request_id.unwrap_or_default(),
        source_address,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
    };
    deliver(&state, message.into()).await
}

/// POST /images/retrieved: the retrieval worker stored the resource.
#[tracing::instrument(skip_all)]
pub async fn retrieved<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<ImageRetrievedBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let source_address = require_source(body.source_address)?;
    let message = ImageRetrieved {
        source_address,
        local_address: body.local_address,
        content_type: body.content_type,
        content_length: body.content_length,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
    };
    deliver(&state, message.into()).await
}

/// POST /images/failed: the retrieval worker gave up.
#[tracing::instrument(skip_all)]
pub async fn failed<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<ImageRetrievalFailedBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let source_address = require_source(body.source_address)?;
    let message = ImageRetrievalFailed {
        source_address,
        reason: body.reason,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
    };
    deliver(&state, message.into()).await
}

/// POST /images/not-found: the resource does not exist.
///
/// Accepted for completeness; no saga state handles it.
#[tracing::instrument(skip_all)]
pub async fn not_found<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<ImageNotFoundBody>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let source_address = require_source(body.source_address)?;
    let message = ImageNotFound {
        source_address,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
    };
    deliver(&state, message.into()).await
}

/// GET /images/sagas/{id}: load a saga by correlation id.
#[tracing::instrument(skip(state))]
pub async fn get<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<ImageSaga>, ApiError> {
    let correlation_id: CorrelationId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid correlation id: {e}")))?;

    find(&state, SagaLookup::CorrelationId(correlation_id)).await
}

/// GET /images?source={uri}: load the saga for a resource.
#[tracing::instrument(skip(state, query))]
pub async fn by_source<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<ImageSaga>, ApiError> {
    let source = query
        .source
        .ok_or_else(|| ApiError::BadRequest("Missing query parameter: source".to_string()))?;
    let source = require_source(source)?;

    find(&state, SagaLookup::ResourceKey(source)).await
}

async fn deliver<R: SagaRepository>(
    state: &AppState<R>,
    message: InboundMessage,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let transition = state.engine.deliver(message, &state.publisher).await?;
    let status = if transition.action == Action::Create {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(transition.into())))
}

async fn find<R: SagaRepository>(
    state: &AppState<R>,
    lookup: SagaLookup,
) -> Result<Json<ImageSaga>, ApiError> {
    state
        .engine
        .repository()
        .find(&lookup)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No saga for {lookup}")))
}

fn require_source(source_address: String) -> Result<String, ApiError> {
    let trimmed = source_address.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(
            "sourceAddress must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
