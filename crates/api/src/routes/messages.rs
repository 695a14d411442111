//! Outbound message history.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use contracts::OutboundMessage;
use saga_store::SagaRepository;

use crate::routes::images::AppState;

/// GET /messages: every retained outbound message, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Json<Vec<OutboundMessage>> {
    Json(state.publisher.messages().await)
}
