use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Actions recorded in the external audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    MessageAppend,
    ThreadMarkRead,
    LegalRelevanceToggle,
    ExportGenerate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageAppend => "message.append",
            Self::ThreadMarkRead => "thread.mark_read",
            Self::LegalRelevanceToggle => "message.toggle_legal_relevance",
            Self::ExportGenerate => "export.generate",
        }
    }
}

/// Wire shape accepted by the audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: String,
    pub actor_id: String,
    pub resource_id: String,
    pub timestamp: String,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        actor_id: impl Into<String>,
        resource_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action: action.as_str().to_string(),
            actor_id: actor_id.into(),
            resource_id: resource_id.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
