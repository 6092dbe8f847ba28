use chrono::{DateTime, TimeDelta, Utc};

use harmonia_types::models::{DeliveryStatus, Message};

/// Hours after which an unread received message counts as unanswered.
pub const UNANSWERED_THRESHOLD_HOURS: i64 = 24;

pub fn unanswered_threshold() -> TimeDelta {
    TimeDelta::hours(UNANSWERED_THRESHOLD_HOURS)
}

/// Received by `asker_id`, still unread, and at least 24h old.
pub fn is_unanswered(message: &Message, asker_id: &str, now: DateTime<Utc>) -> bool {
    message.sender_id != asker_id
        && message.read_at.is_none()
        && now - message.created_at >= unanswered_threshold()
}

pub fn count_unanswered(messages: &[Message], viewer_id: &str, now: DateTime<Utc>) -> usize {
    messages
        .iter()
        .filter(|m| is_unanswered(m, viewer_id, now))
        .count()
}

/// Single check once delivered, double check once read.
pub fn delivery_status(message: &Message) -> DeliveryStatus {
    if message.read_at.is_some() {
        DeliveryStatus::Read
    } else {
        DeliveryStatus::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use harmonia_types::models::{GuardianRole, MessageKind};

    fn received(created_at: DateTime<Utc>) -> Message {
        Message {
            id: 1,
            thread_id: "case-1".into(),
            sender_id: "ana".into(),
            sender_display_name: "Ana".into(),
            sender_role: GuardianRole::GuardianA,
            kind: MessageKind::Text,
            body: "Pode buscar as crianças?".into(),
            created_at,
            delivered_at: Some(created_at),
            read_at: None,
            legally_relevant: false,
            flagged_offensive: false,
        }
    }

    #[test]
    fn threshold_is_inclusive_at_24_hours() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let message = received(t0);

        assert!(!is_unanswered(&message, "bruno", t0 + TimeDelta::minutes(23 * 60 + 59)));
        assert!(is_unanswered(&message, "bruno", t0 + TimeDelta::hours(24)));
        assert!(is_unanswered(&message, "bruno", t0 + TimeDelta::minutes(24 * 60 + 1)));
    }

    #[test]
    fn own_messages_are_never_unanswered() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let message = received(t0);
        assert!(!is_unanswered(&message, "ana", t0 + TimeDelta::days(365)));
    }

    #[test]
    fn read_messages_are_answered() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut message = received(t0);
        message.read_at = Some(t0 + TimeDelta::hours(30));
        assert!(!is_unanswered(&message, "bruno", t0 + TimeDelta::hours(48)));
        assert_eq!(delivery_status(&message), DeliveryStatus::Read);
    }

    #[test]
    fn count_excludes_viewer_messages() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut own = received(t0);
        own.sender_id = "bruno".into();
        let messages = vec![received(t0), received(t0 + TimeDelta::hours(1)), own];

        let now = t0 + TimeDelta::hours(24) + TimeDelta::minutes(30);
        assert_eq!(count_unanswered(&messages, "bruno", now), 1);
        assert_eq!(count_unanswered(&messages, "ana", now), 1);
        assert_eq!(count_unanswered(&[], "bruno", now), 0);
    }
}
