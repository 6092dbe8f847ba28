pub mod error;
pub mod export;
pub mod messages;
pub mod middleware;
pub mod relevance;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::middleware::require_session;
use crate::state::AppState;

/// All pipeline routes. Everything except `/health` needs a session.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/threads/{thread_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/threads/{thread_id}/read", post(messages::mark_read))
        .route("/threads/{thread_id}/unanswered", get(messages::unanswered))
        .route("/threads/{thread_id}/export", get(export::export_thread))
        .route(
            "/messages/{message_id}/legal-relevance",
            post(relevance::toggle_legal_relevance),
        )
        .layer(axum_middleware::from_fn(require_session))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}
