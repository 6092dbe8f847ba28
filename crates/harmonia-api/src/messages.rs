use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};

use harmonia_core::tracker;
use harmonia_integrity::{display_truncate, message_fingerprint};
use harmonia_types::api::{
    MarkReadResponse, MessageResponse, SendMessageRequest, UnansweredResponse,
};
use harmonia_types::models::{Message, MessageDraft, MessageKind, Session};

use crate::error::{join_failed, reject};
use crate::state::AppState;

/// Render a stored message for the session that asked for it.
pub fn to_response(message: &Message, viewer_id: &str, now: DateTime<Utc>) -> MessageResponse {
    let fingerprint = message_fingerprint(message);
    MessageResponse {
        id: message.id,
        thread_id: message.thread_id.clone(),
        sender_id: message.sender_id.clone(),
        sender_display_name: message.sender_display_name.clone(),
        sender_role: message.sender_role,
        kind: message.kind,
        body: message.body.clone(),
        created_at: message.created_at,
        delivered_at: message.delivered_at,
        read_at: message.read_at,
        legally_relevant: message.legally_relevant,
        flagged_offensive: message.flagged_offensive,
        delivery_status: tracker::delivery_status(message),
        unanswered: tracker::is_unanswered(message, viewer_id, now),
        fingerprint_display: display_truncate(&fingerprint),
        fingerprint,
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(session): Extension<Session>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let kind = match req.audio_duration_secs {
        Some(duration_secs) => MessageKind::Audio { duration_secs },
        None => MessageKind::Text,
    };
    let draft = MessageDraft {
        thread_id,
        sender_id: session.actor_id.clone(),
        sender_display_name: req.sender_display_name,
        sender_role: req.sender_role,
        kind,
        body: req.body,
    };

    // The journal write happens under the thread lock; keep it off the async runtime
    let st = state.clone();
    let sess = session.clone();
    let message = tokio::task::spawn_blocking(move || {
        let id = st.store.append(&sess, draft)?;
        st.store.get(&sess, id)
    })
    .await
    .map_err(join_failed)?
    .map_err(reject)?;

    let now = state.store.now();
    Ok((
        StatusCode::CREATED,
        Json(to_response(&message, &session.actor_id, now)),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = state.store.snapshot(&session, &thread_id).map_err(reject)?;
    let now = state.store.now();

    let response: Vec<MessageResponse> = messages
        .iter()
        .map(|m| to_response(m, &session.actor_id, now))
        .collect();

    Ok(Json(response))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    let updated = tokio::task::spawn_blocking(move || st.store.mark_read(&session, &thread_id))
        .await
        .map_err(join_failed)?
        .map_err(reject)?;

    Ok(Json(MarkReadResponse { updated }))
}

pub async fn unanswered(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, StatusCode> {
    let count = state
        .store
        .count_unanswered(&session, &thread_id)
        .map_err(reject)?;

    Ok(Json(UnansweredResponse { thread_id, count }))
}
