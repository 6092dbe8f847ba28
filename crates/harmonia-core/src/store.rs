use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use harmonia_db::Database;
use harmonia_db::models::MessageRow;
use harmonia_types::events::{AuditAction, AuditEvent};
use harmonia_types::models::{
    GuardianRole, Message, MessageDraft, MessageId, MessageKind, Session, audio_placeholder,
};

use crate::audit::AuditDispatcher;
use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use crate::moderation::{ContentFilter, classify_message};
use crate::tracker;

/// Messages of one thread, kept sorted by `created_at`, ties in insertion order.
type ThreadLog = Arc<RwLock<Vec<Message>>>;

/// Append-only, per-thread ordered message storage.
///
/// Each thread has its own lock: mutations on one thread are serialized,
/// different threads never contend. Readers clone a consistent snapshot
/// under the read lock, so a half-appended message is never observable.
///
/// With a journal attached, every change is written to SQLite inside the
/// same critical section before it becomes visible in memory.
pub struct MessageStore {
    threads: RwLock<HashMap<String, ThreadLog>>,
    /// message id -> thread id
    locations: RwLock<HashMap<MessageId, String>>,
    next_id: AtomicU64,
    filter: RwLock<Arc<dyn ContentFilter>>,
    clock: Arc<dyn Clock>,
    audit: AuditDispatcher,
    journal: Option<Arc<Database>>,
}

impl MessageStore {
    /// Memory-only store.
    pub fn new(filter: Arc<dyn ContentFilter>, clock: Arc<dyn Clock>, audit: AuditDispatcher) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            locations: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            filter: RwLock::new(filter),
            clock,
            audit,
            journal: None,
        }
    }

    /// Store backed by a journal. Replays every journaled message.
    pub fn open(
        journal: Arc<Database>,
        filter: Arc<dyn ContentFilter>,
        clock: Arc<dyn Clock>,
        audit: AuditDispatcher,
    ) -> Result<Self> {
        let rows = journal.load_messages().map_err(PipelineError::storage)?;

        let mut threads: HashMap<String, Vec<Message>> = HashMap::new();
        let mut locations = HashMap::with_capacity(rows.len());
        let mut max_id = 0;
        for row in rows {
            let message = message_from_row(row)?;
            max_id = max_id.max(message.id);
            locations.insert(message.id, message.thread_id.clone());
            threads
                .entry(message.thread_id.clone())
                .or_default()
                .push(message);
        }

        for messages in threads.values_mut() {
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        }

        info!(
            "Replayed {} messages across {} threads from journal",
            locations.len(),
            threads.len()
        );

        Ok(Self {
            threads: RwLock::new(
                threads
                    .into_iter()
                    .map(|(id, messages)| (id, Arc::new(RwLock::new(messages))))
                    .collect(),
            ),
            locations: RwLock::new(locations),
            next_id: AtomicU64::new(max_id + 1),
            filter: RwLock::new(filter),
            clock,
            audit,
            journal: Some(journal),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    /// Install a new moderation filter for future appends. Existing
    /// verdicts are never recomputed.
    pub fn replace_filter(&self, filter: Arc<dyn ContentFilter>) -> Result<()> {
        *write(&self.filter)? = filter;
        info!("Moderation filter replaced");
        Ok(())
    }

    // -- Mutations --

    pub fn append(&self, session: &Session, draft: MessageDraft) -> Result<MessageId> {
        require_write(session, "send messages")?;
        validate(&draft)?;
        if draft.sender_id != session.actor_id {
            return Err(PipelineError::Forbidden(
                "cannot send on behalf of another participant".into(),
            ));
        }

        let body = match draft.kind {
            MessageKind::Audio { duration_secs } if draft.body.trim().is_empty() => {
                audio_placeholder(duration_secs)
            }
            _ => draft.body,
        };
        let filter = read(&self.filter)?.clone();
        let flagged_offensive = classify_message(filter.as_ref(), &draft.kind, &body);

        let log = self.thread_or_create(&draft.thread_id)?;
        let mut messages = write(&log)?;
        let sender_display_name = bind_participant(
            &messages,
            &draft.sender_id,
            draft.sender_role,
            &draft.sender_display_name,
        )?;

        let created_at = self.clock.now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id,
            thread_id: draft.thread_id,
            sender_id: draft.sender_id,
            sender_display_name,
            sender_role: draft.sender_role,
            kind: draft.kind,
            body,
            created_at,
            // Delivery is immediate
            delivered_at: Some(created_at),
            read_at: None,
            legally_relevant: false,
            flagged_offensive,
        };

        if let Some(journal) = &self.journal {
            journal
                .insert_message(&message_to_row(&message))
                .map_err(PipelineError::storage)?;
        }

        write(&self.locations)?.insert(id, message.thread_id.clone());
        let thread_id = message.thread_id.clone();
        let pos = messages.partition_point(|m| m.created_at <= created_at);
        messages.insert(pos, message);
        // Queued under the lock so audit order matches store order
        self.audit.emit(AuditEvent::new(
            AuditAction::MessageAppend,
            session.actor_id.as_str(),
            id.to_string(),
            created_at,
        ));
        drop(messages);

        debug!(
            message_id = id,
            thread_id = %thread_id,
            flagged = flagged_offensive,
            "Message appended"
        );

        Ok(id)
    }

    /// Mark every message in the thread not sent by the reader as read now.
    /// Messages already read keep their timestamp. Returns how many changed.
    pub fn mark_read(&self, session: &Session, thread_id: &str) -> Result<usize> {
        require_write(session, "mark messages as read")?;
        let log = self
            .thread(thread_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("thread {}", thread_id)))?;
        let mut messages = write(&log)?;
        if messages.is_empty() {
            return Err(PipelineError::NotFound(format!("thread {}", thread_id)));
        }

        let now = self.clock.now();
        let pending: Vec<(usize, DateTime<Utc>)> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.sender_id != session.actor_id && m.read_at.is_none())
            // read_at never precedes delivered_at
            .map(|(i, m)| (i, now.max(m.delivered_at.unwrap_or(m.created_at))))
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        if let Some(journal) = &self.journal {
            let reads: Vec<(i64, String)> = pending
                .iter()
                .map(|(i, at)| (messages[*i].id as i64, format_timestamp(at)))
                .collect();
            journal.mark_read(&reads).map_err(PipelineError::storage)?;
        }

        for (i, at) in &pending {
            messages[*i].read_at = Some(*at);
        }
        self.audit.emit(AuditEvent::new(
            AuditAction::ThreadMarkRead,
            session.actor_id.as_str(),
            thread_id,
            now,
        ));
        drop(messages);

        debug!(thread_id, reader = %session.actor_id, count = pending.len(), "Thread marked read");

        Ok(pending.len())
    }

    /// Flip the legal relevance tag. Returns the new value.
    pub fn toggle_legal_relevance(&self, session: &Session, message_id: MessageId) -> Result<bool> {
        require_write(session, "tag legal relevance")?;
        let thread_id = read(&self.locations)?
            .get(&message_id)
            .cloned()
            .ok_or_else(|| message_not_found(message_id))?;
        let log = self
            .thread(&thread_id)?
            .ok_or_else(|| message_not_found(message_id))?;

        let mut messages = write(&log)?;
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| message_not_found(message_id))?;

        let relevant = !message.legally_relevant;
        if let Some(journal) = &self.journal {
            journal
                .set_legal_relevance(message_id as i64, relevant)
                .map_err(PipelineError::storage)?;
        }
        message.legally_relevant = relevant;
        self.audit.emit(AuditEvent::new(
            AuditAction::LegalRelevanceToggle,
            session.actor_id.as_str(),
            message_id.to_string(),
            self.clock.now(),
        ));
        drop(messages);

        debug!(message_id, relevant, "Legal relevance toggled");

        Ok(relevant)
    }

    // -- Reads --

    /// Time-ordered copy of the thread as visible to the session.
    /// Unknown threads read as empty.
    pub fn snapshot(&self, session: &Session, thread_id: &str) -> Result<Vec<Message>> {
        match self.thread(thread_id)? {
            Some(log) => Ok(read(&log)?
                .iter()
                .filter(|m| session.can_see(m))
                .cloned()
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// One message, if the session may see it.
    pub fn get(&self, session: &Session, message_id: MessageId) -> Result<Message> {
        let thread_id = read(&self.locations)?
            .get(&message_id)
            .cloned()
            .ok_or_else(|| message_not_found(message_id))?;
        let log = self
            .thread(&thread_id)?
            .ok_or_else(|| message_not_found(message_id))?;
        let messages = read(&log)?;
        messages
            .iter()
            .find(|m| m.id == message_id && session.can_see(m))
            .cloned()
            .ok_or_else(|| message_not_found(message_id))
    }

    pub fn count_unanswered(&self, session: &Session, thread_id: &str) -> Result<usize> {
        let messages = self.snapshot(session, thread_id)?;
        Ok(tracker::count_unanswered(&messages, &session.actor_id, self.clock.now()))
    }

    /// Ids of every thread holding at least one message, sorted.
    pub fn thread_ids(&self) -> Result<Vec<String>> {
        let threads = read(&self.threads)?;
        let mut ids = Vec::with_capacity(threads.len());
        for (id, log) in threads.iter() {
            if !read(log)?.is_empty() {
                ids.push(id.clone());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn thread(&self, thread_id: &str) -> Result<Option<ThreadLog>> {
        Ok(read(&self.threads)?.get(thread_id).cloned())
    }

    fn thread_or_create(&self, thread_id: &str) -> Result<ThreadLog> {
        if let Some(log) = self.thread(thread_id)? {
            return Ok(log);
        }
        let mut threads = write(&self.threads)?;
        Ok(threads.entry(thread_id.to_string()).or_default().clone())
    }
}

fn require_write(session: &Session, what: &str) -> Result<()> {
    if session.can_write() {
        Ok(())
    } else {
        Err(PipelineError::Forbidden(format!("viewers cannot {}", what)))
    }
}

fn validate(draft: &MessageDraft) -> Result<()> {
    if draft.thread_id.trim().is_empty() {
        return Err(PipelineError::Validation("thread_id is required".into()));
    }
    if draft.sender_id.trim().is_empty() {
        return Err(PipelineError::Validation("sender_id is required".into()));
    }
    if draft.kind == MessageKind::Text && draft.body.trim().is_empty() {
        return Err(PipelineError::Validation("text message body is empty".into()));
    }
    if draft.sender_display_name.chars().any(char::is_control) {
        return Err(PipelineError::Validation(
            "sender_display_name must be a single line".into(),
        ));
    }
    Ok(())
}

/// Resolve the display name for a sender and hold them to one seat.
///
/// The first message of a sender in a thread fixes their role and display
/// name. Later messages must match, and nobody else may take that role or
/// name. A blank name reuses the bound one, or the sender id for newcomers.
fn bind_participant(
    messages: &[Message],
    sender_id: &str,
    role: GuardianRole,
    requested_name: &str,
) -> Result<String> {
    let requested_name = requested_name.trim();

    if let Some(prior) = messages.iter().find(|m| m.sender_id == sender_id) {
        if prior.sender_role != role {
            return Err(PipelineError::Forbidden(format!(
                "{} already writes as {} in this thread",
                sender_id,
                prior.sender_role.tag()
            )));
        }
        if !requested_name.is_empty() && requested_name != prior.sender_display_name {
            return Err(PipelineError::Forbidden(format!(
                "{} already writes as '{}' in this thread",
                sender_id, prior.sender_display_name
            )));
        }
        return Ok(prior.sender_display_name.clone());
    }

    let name = if requested_name.is_empty() {
        sender_id.to_string()
    } else {
        requested_name.to_string()
    };
    if messages.iter().any(|m| m.sender_role == role) {
        return Err(PipelineError::Forbidden(format!(
            "{} is held by another participant in this thread",
            role.tag()
        )));
    }
    let lowered = name.to_lowercase();
    if messages
        .iter()
        .any(|m| m.sender_display_name.to_lowercase() == lowered)
    {
        return Err(PipelineError::Forbidden(format!(
            "display name '{}' belongs to another participant in this thread",
            name
        )));
    }
    Ok(name)
}

fn message_not_found(message_id: MessageId) -> PipelineError {
    PipelineError::NotFound(format!("message {}", message_id))
}

fn read<T: ?Sized>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| PipelineError::Internal("store lock poisoned".into()))
}

fn write<T: ?Sized>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| PipelineError::Internal("store lock poisoned".into()))
}

// -- Journal rows --

/// Fixed-width so lexical order in SQLite matches time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::Storage(format!("corrupt timestamp '{}': {}", value, e)))
}

fn message_to_row(message: &Message) -> MessageRow {
    MessageRow {
        id: message.id as i64,
        thread_id: message.thread_id.clone(),
        sender_id: message.sender_id.clone(),
        sender_display_name: message.sender_display_name.clone(),
        sender_role: message.sender_role.as_str().to_string(),
        kind: message.kind.as_str().to_string(),
        duration_secs: message.kind.duration_secs().map(i64::from),
        body: message.body.clone(),
        created_at: format_timestamp(&message.created_at),
        delivered_at: message.delivered_at.as_ref().map(format_timestamp),
        read_at: message.read_at.as_ref().map(format_timestamp),
        legally_relevant: message.legally_relevant,
        flagged_offensive: message.flagged_offensive,
    }
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    let sender_role = GuardianRole::parse(&row.sender_role).ok_or_else(|| {
        PipelineError::Storage(format!("corrupt sender_role '{}' on message {}", row.sender_role, row.id))
    })?;
    let kind = match (row.kind.as_str(), row.duration_secs) {
        ("text", _) => MessageKind::Text,
        ("audio", Some(secs)) => MessageKind::Audio {
            duration_secs: u32::try_from(secs).map_err(|_| {
                PipelineError::Storage(format!("corrupt duration {} on message {}", secs, row.id))
            })?,
        },
        (other, _) => {
            return Err(PipelineError::Storage(format!(
                "corrupt kind '{}' on message {}",
                other, row.id
            )));
        }
    };
    let id = u64::try_from(row.id)
        .map_err(|_| PipelineError::Storage(format!("corrupt message id {}", row.id)))?;

    Ok(Message {
        id,
        created_at: parse_timestamp(&row.created_at)?,
        delivered_at: row.delivered_at.as_deref().map(parse_timestamp).transpose()?,
        read_at: row.read_at.as_deref().map(parse_timestamp).transpose()?,
        thread_id: row.thread_id,
        sender_id: row.sender_id,
        sender_display_name: row.sender_display_name,
        sender_role,
        kind,
        body: row.body,
        legally_relevant: row.legally_relevant,
        flagged_offensive: row.flagged_offensive,
    })
}
