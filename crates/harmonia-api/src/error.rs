use axum::http::StatusCode;
use tracing::{debug, error};

use harmonia_core::PipelineError;

pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
        PipelineError::SinkUnavailable(_)
        | PipelineError::Storage(_)
        | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a pipeline error to a status, logging server-side failures.
pub fn reject(err: PipelineError) -> StatusCode {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Pipeline error: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }
    status
}

pub fn join_failed(err: tokio::task::JoinError) -> StatusCode {
    error!("spawn_blocking join error: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}
