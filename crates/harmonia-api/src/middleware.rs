use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

use harmonia_types::models::{Capability, Session};

/// Authenticated actor, set by the upstream auth layer.
pub const ACTOR_HEADER: &str = "x-actor-id";
/// `guardian` or `viewer`. Missing means viewer.
pub const CAPABILITY_HEADER: &str = "x-capability";

/// Build the request's [`Session`] from the headers the auth layer sets.
pub async fn require_session(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let actor_id = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let capability = match req.headers().get(CAPABILITY_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(Capability::parse)
            .ok_or(StatusCode::BAD_REQUEST)?,
        None => Capability::Viewer,
    };

    req.extensions_mut().insert(Session {
        actor_id,
        capability,
    });
    Ok(next.run(req).await)
}
