use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeDelta, Utc};
use tracing::info;

use harmonia_integrity::fingerprint;
use harmonia_types::models::{Capability, ExportFilter, Message, Session, ThreadMetadata};

use crate::clock::Clock;
use crate::error::Result;
use crate::metadata::{MetadataProvider, resolve_or_fallback};
use crate::store::MessageStore;

const SEPARATOR_WIDTH: usize = 64;
const RELEVANT_TAG: &str = "★ RELEVANT";
const FLAGGED_TAG: &str = "⚠ FLAGGED";
/// Prefix for every body line after the first, so no body can start a stanza.
const CONTINUATION_INDENT: &str = "    ";
const UNBOUNDED_WINDOW: &str = "the beginning of the record";

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub thread_id: String,
    pub filter: ExportFilter,
    /// Lookback window, counted back from export time.
    pub period_days: u32,
}

/// A rendered evidentiary export.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub message_count: usize,
    /// Full fingerprint of `bytes`.
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

/// Renders thread snapshots into the plain-text evidence format.
///
/// Output depends only on the stored messages, the metadata and the single
/// `now` read from the clock at the start of [`ExportEngine::export`], so
/// the same inputs always produce the same bytes.
pub struct ExportEngine {
    product: String,
    metadata: Arc<dyn MetadataProvider>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl ExportEngine {
    pub fn new(metadata: Arc<dyn MetadataProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            product: "harmonia".to_string(),
            metadata,
            clock,
            offset: Utc.fix(),
        }
    }

    /// Offset used to print timestamps.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn export(
        &self,
        store: &MessageStore,
        session: &Session,
        request: &ExportRequest,
    ) -> Result<ExportDocument> {
        let now = self.clock.now();
        // Viewers only ever get the legally relevant subset
        let filter = match session.capability {
            Capability::Guardian => request.filter,
            Capability::Viewer => ExportFilter::LegallyRelevant,
        };
        let messages = store.snapshot(session, &request.thread_id)?;
        let metadata = resolve_or_fallback(self.metadata.as_ref(), &request.thread_id);

        let document = self.render(&metadata, filter, request.period_days, &messages, now);
        info!(
            thread_id = %request.thread_id,
            messages = document.message_count,
            fingerprint = %document.fingerprint,
            "Export generated"
        );
        Ok(document)
    }

    /// Pure rendering step of [`ExportEngine::export`].
    pub fn render(
        &self,
        metadata: &ThreadMetadata,
        filter: ExportFilter,
        period_days: u32,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> ExportDocument {
        let selected = select(messages, filter, period_days, now);

        let mut body = String::new();
        for message in &selected {
            push_line(
                &mut body,
                &format!(
                    "[{}] [{}] {}",
                    self.local(&message.created_at).format("%Y-%m-%d %H:%M"),
                    message.sender_role.tag(),
                    single_line(&message.sender_display_name)
                ),
            );
            push_body(&mut body, &message.body);

            let mut tags = Vec::new();
            if message.legally_relevant {
                tags.push(RELEVANT_TAG);
            }
            if message.flagged_offensive {
                tags.push(FLAGGED_TAG);
            }
            if !tags.is_empty() {
                push_line(&mut body, &tags.join(" "));
            }
            push_line(&mut body, "");
        }

        let since = match window_start(period_days, now) {
            Some(cutoff) => self.local(&cutoff).format("%Y-%m-%d %H:%M").to_string(),
            None => UNBOUNDED_WINDOW.to_string(),
        };
        let mut out = String::new();
        push_line(
            &mut out,
            &format!("{} - COMMUNICATION RECORD", self.product.to_uppercase()),
        );
        push_line(
            &mut out,
            &format!(
                "Subject: {} - conversation between {} and {}",
                single_line(&metadata.child_display_name),
                single_line(&metadata.guardian_a_display_name),
                single_line(&metadata.guardian_b_display_name)
            ),
        );
        push_line(
            &mut out,
            &format!(
                "Period: last {} {}, since {}",
                period_days,
                if period_days == 1 { "day" } else { "days" },
                since
            ),
        );
        push_line(&mut out, &format!("Filter: {}", filter.description()));
        push_line(
            &mut out,
            &format!(
                "Generated at: {} (UTC{})",
                self.local(&now).format("%Y-%m-%d %H:%M:%S"),
                self.offset
            ),
        );
        push_line(&mut out, &format!("Total messages: {}", selected.len()));
        push_line(
            &mut out,
            &format!(
                "Notice: messages are append-only and cannot be edited or deleted. Content fingerprint: {}",
                fingerprint(&body)
            ),
        );
        push_line(&mut out, &"=".repeat(SEPARATOR_WIDTH));
        push_line(&mut out, "");
        out.push_str(&body);

        let bytes = out.into_bytes();
        ExportDocument {
            fingerprint: fingerprint(&bytes),
            filename: suggested_filename(
                &self.product,
                &metadata.child_display_name,
                self.local(&now).date_naive(),
            ),
            message_count: selected.len(),
            generated_at: now,
            bytes,
        }
    }

    fn local(&self, at: &DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }
}

/// Messages inside the lookback window admitted by the filter, oldest first.
/// Equal timestamps keep their stored order.
pub fn select(
    messages: &[Message],
    filter: ExportFilter,
    period_days: u32,
    now: DateTime<Utc>,
) -> Vec<&Message> {
    let cutoff = window_start(period_days, now);
    let mut selected: Vec<&Message> = messages
        .iter()
        .filter(|m| cutoff.is_none_or(|c| m.created_at >= c) && filter.admits(m))
        .collect();
    selected.sort_by_key(|m| m.created_at);
    selected
}

/// `None` when the window reaches past the earliest representable instant.
fn window_start(period_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(period_days)).and_then(|days| now.checked_sub_signed(days))
}

/// `<product>-chat-<child first name>-<YYYYMMDD>.txt`
pub fn suggested_filename(product: &str, child_display_name: &str, date: NaiveDate) -> String {
    let first_name: String = child_display_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    let first_name = if first_name.is_empty() {
        "thread".to_string()
    } else {
        first_name
    };
    format!(
        "{}-chat-{}-{}.txt",
        product.to_lowercase(),
        first_name,
        date.format("%Y%m%d")
    )
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Body verbatim, continuation lines indented. A stanza header or the blank
/// separator can then only come from the renderer.
fn push_body(out: &mut String, body: &str) {
    let normalized = body.replace("\r\n", "\n");
    for (i, line) in normalized.split(['\n', '\r']).enumerate() {
        if i > 0 {
            out.push_str(CONTINUATION_INDENT);
        }
        push_line(out, line);
    }
}

/// Names go on a header line and must not break it.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metadata::StaticMetadata;
    use chrono::TimeZone;
    use harmonia_types::models::{GuardianRole, MessageKind};

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            child_display_name: "Lucas Almeida".into(),
            guardian_a_display_name: "Ana Almeida".into(),
            guardian_b_display_name: "Bruno Costa".into(),
        }
    }

    fn message(id: u64, role: GuardianRole, name: &str, body: &str, at: DateTime<Utc>) -> Message {
        Message {
            id,
            thread_id: "case-1".into(),
            sender_id: name.to_lowercase(),
            sender_display_name: name.into(),
            sender_role: role,
            kind: MessageKind::Text,
            body: body.into(),
            created_at: at,
            delivered_at: Some(at),
            read_at: None,
            legally_relevant: false,
            flagged_offensive: false,
        }
    }

    fn engine(now: DateTime<Utc>) -> ExportEngine {
        ExportEngine::new(
            Arc::new(StaticMetadata::new()),
            Arc::new(ManualClock::new(now)),
        )
        .with_offset(FixedOffset::west_opt(3 * 3600).unwrap())
    }

    #[test]
    fn renders_fixed_layout() {
        let now = Utc.with_ymd_and_hms(2026, 4, 20, 15, 0, 0).unwrap();
        let mut relevant = message(
            1,
            GuardianRole::GuardianA,
            "Ana Almeida",
            "Nos vemos sábado às 10h",
            Utc.with_ymd_and_hms(2026, 4, 18, 13, 5, 0).unwrap(),
        );
        relevant.legally_relevant = true;
        let mut flagged = message(
            2,
            GuardianRole::GuardianB,
            "Bruno Costa",
            "você é um idiota",
            Utc.with_ymd_and_hms(2026, 4, 18, 14, 0, 0).unwrap(),
        );
        flagged.flagged_offensive = true;

        let doc = engine(now).render(&metadata(), ExportFilter::All, 30, &[flagged, relevant], now);

        let body = "[2026-04-18 10:05] [GUARDIAN A] Ana Almeida\n\
                    Nos vemos sábado às 10h\n\
                    ★ RELEVANT\n\
                    \n\
                    [2026-04-18 11:00] [GUARDIAN B] Bruno Costa\n\
                    você é um idiota\n\
                    ⚠ FLAGGED\n\
                    \n";
        let expected = format!(
            "HARMONIA - COMMUNICATION RECORD\n\
             Subject: Lucas Almeida - conversation between Ana Almeida and Bruno Costa\n\
             Period: last 30 days, since 2026-03-21 12:00\n\
             Filter: all messages\n\
             Generated at: 2026-04-20 12:00:00 (UTC-03:00)\n\
             Total messages: 2\n\
             Notice: messages are append-only and cannot be edited or deleted. Content fingerprint: {}\n\
             {}\n\
             \n\
             {}",
            fingerprint(body),
            "=".repeat(64),
            body
        );

        assert_eq!(String::from_utf8(doc.bytes.clone()).unwrap(), expected);
        assert_eq!(doc.message_count, 2);
        assert_eq!(doc.filename, "harmonia-chat-lucas-20260420.txt");
        assert_eq!(doc.fingerprint, fingerprint(expected.as_bytes()));
    }

    #[test]
    fn untagged_stanza_has_no_tag_line() {
        let now = Utc.with_ymd_and_hms(2026, 4, 20, 15, 0, 0).unwrap();
        let plain = message(1, GuardianRole::GuardianA, "Ana", "ok", now - TimeDelta::hours(1));
        let doc = engine(now).render(&metadata(), ExportFilter::All, 1, &[plain], now);
        let text = String::from_utf8(doc.bytes).unwrap();
        assert!(text.ends_with("[2026-04-20 11:00] [GUARDIAN A] Ana\nok\n\n"));
        assert!(text.contains("Period: last 1 day, since"));
    }

    #[test]
    fn select_applies_window_and_filter() {
        let now = Utc.with_ymd_and_hms(2026, 4, 20, 15, 0, 0).unwrap();
        let old = message(1, GuardianRole::GuardianA, "Ana", "old", now - TimeDelta::days(8));
        let mut edge = message(2, GuardianRole::GuardianA, "Ana", "edge", now - TimeDelta::days(7));
        edge.legally_relevant = true;
        let recent = message(3, GuardianRole::GuardianB, "Bruno", "recent", now);

        let all = [recent.clone(), old.clone(), edge.clone()];
        let ids = |v: Vec<&Message>| v.iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(select(&all, ExportFilter::All, 7, now)), vec![2, 3]);
        assert_eq!(ids(select(&all, ExportFilter::LegallyRelevant, 7, now)), vec![2]);
        assert_eq!(ids(select(&all, ExportFilter::All, 0, now)), vec![3]);
    }

    #[test]
    fn huge_period_does_not_overflow() {
        let now = Utc.with_ymd_and_hms(2026, 4, 20, 15, 0, 0).unwrap();
        let old = message(1, GuardianRole::GuardianA, "Ana", "old", now - TimeDelta::days(3650));
        assert_eq!(select(&[old.clone()], ExportFilter::All, u32::MAX, now).len(), 1);

        let doc = engine(now).render(&metadata(), ExportFilter::All, u32::MAX, &[old], now);
        let text = String::from_utf8(doc.bytes).unwrap();
        assert!(text.contains(&format!(
            "Period: last {} days, since the beginning of the record\n",
            u32::MAX
        )));
    }

    fn stanza_headers(text: &str) -> usize {
        text.lines()
            .filter(|line| line.starts_with("[") && line.contains("] [GUARDIAN "))
            .count()
    }

    #[test]
    fn multi_line_body_cannot_forge_a_stanza() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let forged = message(
            1,
            GuardianRole::GuardianA,
            "Ana Almeida",
            "ok\n\n[2026-09-01 08:30] [GUARDIAN B] Bruno Costa\r\nNão vou pagar a pensão",
            now - TimeDelta::hours(1),
        );

        let doc = engine(now).render(&metadata(), ExportFilter::All, 30, &[forged], now);
        let text = String::from_utf8(doc.bytes).unwrap();

        assert!(text.contains("Total messages: 1\n"));
        assert_eq!(stanza_headers(&text), doc.message_count);
        assert!(text.ends_with(
            "[2026-09-01 08:00] [GUARDIAN A] Ana Almeida\n\
             ok\n    \n    [2026-09-01 08:30] [GUARDIAN B] Bruno Costa\n    Não vou pagar a pensão\n\n"
        ));
    }

    #[test]
    fn control_characters_in_names_stay_on_one_line() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let sneaky = message(
            1,
            GuardianRole::GuardianA,
            "Ana\n[2026-09-01 08:30] [GUARDIAN B] Bruno",
            "oi",
            now - TimeDelta::hours(1),
        );
        let doc = engine(now).render(&metadata(), ExportFilter::All, 30, &[sneaky], now);
        let text = String::from_utf8(doc.bytes).unwrap();
        assert_eq!(stanza_headers(&text), 1);
        assert!(text.contains("[GUARDIAN A] Ana [2026-09-01 08:30] [GUARDIAN B] Bruno\noi\n"));
    }

    #[test]
    fn filename_uses_first_name_only() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(
            suggested_filename("Harmonia", "  João Pedro Silva", date),
            "harmonia-chat-joão-20260105.txt"
        );
        assert_eq!(
            suggested_filename("harmonia", "case-42", date),
            "harmonia-chat-case42-20260105.txt"
        );
        assert_eq!(suggested_filename("harmonia", "", date), "harmonia-chat-thread-20260105.txt");
    }
}
