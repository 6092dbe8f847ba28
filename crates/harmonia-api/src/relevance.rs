use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use harmonia_types::api::ToggleRelevanceResponse;
use harmonia_types::models::{MessageId, Session};

use crate::error::{join_failed, reject};
use crate::state::AppState;

/// Guardians only; viewers get 403 from the store.
pub async fn toggle_legal_relevance(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    let legally_relevant =
        tokio::task::spawn_blocking(move || st.store.toggle_legal_relevance(&session, message_id))
            .await
            .map_err(join_failed)?
            .map_err(reject)?;

    Ok(Json(ToggleRelevanceResponse {
        message_id,
        legally_relevant,
    }))
}
