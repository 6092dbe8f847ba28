use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned message identifier. Increases with insertion order.
pub type MessageId = u64;

// -- Participants --

/// The two guardian seats of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianRole {
    GuardianA,
    GuardianB,
}

impl GuardianRole {
    /// Tag printed next to the sender in evidentiary exports.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::GuardianA => "GUARDIAN A",
            Self::GuardianB => "GUARDIAN B",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuardianA => "guardian_a",
            Self::GuardianB => "guardian_b",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "guardian_a" => Some(Self::GuardianA),
            "guardian_b" => Some(Self::GuardianB),
            _ => None,
        }
    }
}

/// What the caller of the pipeline is allowed to do for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Full participant: may send, mark read and tag legal relevance.
    Guardian,
    /// Authorized third party: read-only, sees legally relevant messages only.
    Viewer,
}

impl Capability {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guardian" => Some(Self::Guardian),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// Ephemeral per-request context. Never stored alongside messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub actor_id: String,
    pub capability: Capability,
}

impl Session {
    pub fn guardian(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            capability: Capability::Guardian,
        }
    }

    pub fn viewer(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            capability: Capability::Viewer,
        }
    }

    pub fn can_write(&self) -> bool {
        self.capability == Capability::Guardian
    }

    /// Whether a stored message is visible under this session.
    pub fn can_see(&self, message: &Message) -> bool {
        match self.capability {
            Capability::Guardian => true,
            Capability::Viewer => message.legally_relevant,
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Audio { duration_secs: u32 },
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio { .. } => "audio",
        }
    }

    pub fn duration_secs(&self) -> Option<u32> {
        match self {
            Self::Text => None,
            Self::Audio { duration_secs } => Some(*duration_secs),
        }
    }
}

/// Placeholder body stored for audio messages sent without a caption.
pub fn audio_placeholder(duration_secs: u32) -> String {
    format!(
        "[audio message {}:{:02}]",
        duration_secs / 60,
        duration_secs % 60
    )
}

/// A message as submitted by a guardian, before the store stamps it.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub thread_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub sender_role: GuardianRole,
    pub kind: MessageKind,
    pub body: String,
}

impl MessageDraft {
    pub fn text(
        thread_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        sender_role: GuardianRole,
        body: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            sender_role,
            kind: MessageKind::Text,
            body: body.into(),
        }
    }

    pub fn audio(
        thread_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        sender_role: GuardianRole,
        duration_secs: u32,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            sender_role,
            kind: MessageKind::Audio { duration_secs },
            body: String::new(),
        }
    }
}

/// A stored message. Content and timestamps are fixed at append time;
/// only `read_at` and `legally_relevant` change afterwards, and only
/// through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
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
}

/// Single check vs. double check in the conversation view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Read,
}

// -- Export --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFilter {
    #[default]
    All,
    LegallyRelevant,
}

impl ExportFilter {
    pub fn description(&self) -> &'static str {
        match self {
            Self::All => "all messages",
            Self::LegallyRelevant => "legally relevant messages only",
        }
    }

    pub fn admits(&self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::LegallyRelevant => message.legally_relevant,
        }
    }
}

/// Display names for a thread, resolved by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub child_display_name: String,
    pub guardian_a_display_name: String,
    pub guardian_b_display_name: String,
}

impl ThreadMetadata {
    /// Used when the provider does not know the thread: every name is the raw id.
    pub fn fallback(thread_id: &str) -> Self {
        Self {
            child_display_name: thread_id.to_string(),
            guardian_a_display_name: thread_id.to_string(),
            guardian_b_display_name: thread_id.to_string(),
        }
    }
}
