use axum::{
    Extension,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use tracing::error;

use harmonia_core::ExportRequest;
use harmonia_types::api::ExportQuery;
use harmonia_types::events::{AuditAction, AuditEvent};
use harmonia_types::models::Session;

use crate::error::reject;
use crate::state::AppState;

pub const FINGERPRINT_HEADER: &str = "x-content-fingerprint";

/// GET /threads/{thread_id}/export: plain-text evidentiary record as an
/// attachment. An empty selection still yields a valid document.
pub async fn export_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<ExportQuery>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, StatusCode> {
    let request = ExportRequest {
        thread_id,
        filter: query.filter,
        period_days: query.period_days,
    };
    let doc = state
        .export
        .export(&state.store, &session, &request)
        .map_err(reject)?;

    state.store.audit().emit(AuditEvent::new(
        AuditAction::ExportGenerate,
        session.actor_id.as_str(),
        request.thread_id.as_str(),
        doc.generated_at,
    ));

    let disposition = content_disposition(&doc.filename);
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (header::CONTENT_DISPOSITION, header_value(&disposition)?),
        (
            HeaderName::from_static(FINGERPRINT_HEADER),
            header_value(&doc.fingerprint)?,
        ),
    ];

    Ok((headers, doc.bytes))
}

/// ASCII `filename` for old clients plus RFC 5987 `filename*` for the real name.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        percent_encode(filename)
    )
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn header_value(value: &str) -> Result<HeaderValue, StatusCode> {
    HeaderValue::from_str(value).map_err(|e| {
        error!("Invalid header value '{}': {}", value, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
