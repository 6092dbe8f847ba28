use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use harmonia_types::models::Message;

/// Prefix naming the digest algorithm.
pub const PREFIX: &str = "sha256:";

/// Hex characters kept by [`display_truncate`].
pub const DISPLAY_HEX_LEN: usize = 8;

const ELLIPSIS: char = '…';

/// Fingerprint arbitrary content. Deterministic: no salt, no timestamp.
pub fn fingerprint(content: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(content.as_ref());
    format!("{}{}", PREFIX, hex::encode(digest))
}

/// Short display form: prefix stripped, first 8 hex chars, ellipsis.
pub fn display_truncate(fingerprint: &str) -> String {
    let hex = fingerprint.strip_prefix(PREFIX).unwrap_or(fingerprint);
    let head: String = hex.chars().take(DISPLAY_HEX_LEN).collect();
    format!("{}{}", head, ELLIPSIS)
}

/// Recompute and compare against a full fingerprint.
pub fn verify(content: impl AsRef<[u8]>, expected: &str) -> bool {
    fingerprint(content) == expected
}

/// Fingerprint of the immutable part of a message.
///
/// Read state and the legal relevance tag are left out so the value stays
/// stable for the life of the message. Each field is length-prefixed so a
/// body containing separators cannot collide with a different split.
pub fn message_fingerprint(message: &Message) -> String {
    let duration = message
        .kind
        .duration_secs()
        .map(|d| d.to_string())
        .unwrap_or_default();
    let created_at = message
        .created_at
        .to_rfc3339_opts(SecondsFormat::Micros, true);

    let id = message.id.to_string();

    let fields: [&str; 8] = [
        &id,
        &message.thread_id,
        &message.sender_id,
        message.sender_role.as_str(),
        message.kind.as_str(),
        &duration,
        &message.body,
        &created_at,
    ];

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(field.as_bytes());
        hasher.update(b";");
    }
    format!("{}{}", PREFIX, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harmonia_types::models::{GuardianRole, MessageKind};

    fn sample() -> Message {
        Message {
            id: 1,
            thread_id: "case-1".into(),
            sender_id: "ana".into(),
            sender_display_name: "Ana".into(),
            sender_role: GuardianRole::GuardianA,
            kind: MessageKind::Text,
            body: "Nos vemos sábado às 10h".into(),
            created_at: Utc.with_ymd_and_hms(2026, 5, 2, 9, 30, 0).unwrap(),
            delivered_at: None,
            read_at: None,
            legally_relevant: false,
            flagged_offensive: false,
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_case_sensitive() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("Hello"));
    }

    #[test]
    fn fingerprint_matches_known_vector() {
        assert_eq!(
            fingerprint("hello"),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn display_truncate_strips_prefix() {
        let fp = fingerprint("hello");
        assert_eq!(display_truncate(&fp), "2cf24dba…");
        assert_eq!(display_truncate("2cf24dba5fb0"), "2cf24dba…");
        assert_eq!(display_truncate("sha256:abc"), "abc…");
    }

    #[test]
    fn verify_needs_full_digest() {
        let fp = fingerprint("hello");
        assert!(verify("hello", &fp));
        assert!(!verify("hello", &display_truncate(&fp)));
    }

    #[test]
    fn message_fingerprint_ignores_mutable_fields() {
        let original = sample();
        let mut touched = original.clone();
        touched.read_at = Some(Utc::now());
        touched.legally_relevant = true;
        assert_eq!(message_fingerprint(&original), message_fingerprint(&touched));

        let mut edited = original.clone();
        edited.body.push('!');
        assert_ne!(message_fingerprint(&original), message_fingerprint(&edited));
    }
}
