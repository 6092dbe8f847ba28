use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed draft. Nothing was stored.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The session's capability does not allow the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Audit sink failed or timed out. Only seen inside the audit worker.
    #[error("Audit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Journal error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
