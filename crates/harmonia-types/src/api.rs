use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeliveryStatus, ExportFilter, GuardianRole, MessageId, MessageKind};

// -- Messages --

/// Body of `POST /threads/{thread_id}/messages`. The sender id comes from
/// the session, never from the payload.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_display_name: String,
    pub sender_role: GuardianRole,
    #[serde(default)]
    pub body: String,
    /// Present for audio messages only.
    #[serde(default)]
    pub audio_duration_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub sender_role: GuardianRole,
    pub kind: MessageKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub legally_relevant: bool,
    pub flagged_offensive: bool,
    pub delivery_status: DeliveryStatus,
    pub unanswered: bool,
    /// Full `sha256:<hex>` digest, for verification.
    pub fingerprint: String,
    /// Truncated form shown next to the message.
    pub fingerprint_display: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleRelevanceResponse {
    pub message_id: MessageId,
    pub legally_relevant: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnansweredResponse {
    pub thread_id: String,
    pub count: usize,
}

// -- Export --

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub filter: ExportFilter,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

fn default_period_days() -> u32 {
    30
}
