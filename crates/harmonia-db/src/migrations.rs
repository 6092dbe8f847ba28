use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Journal: running migration v1 (messages)");
        conn.execute_batch(
            "
            CREATE TABLE messages (
                id                   INTEGER PRIMARY KEY,
                thread_id            TEXT NOT NULL,
                sender_id            TEXT NOT NULL,
                sender_display_name  TEXT NOT NULL,
                sender_role          TEXT NOT NULL,
                kind                 TEXT NOT NULL,
                duration_secs        INTEGER,
                body                 TEXT NOT NULL,
                created_at           TEXT NOT NULL,
                delivered_at         TEXT,
                read_at              TEXT,
                legally_relevant     INTEGER NOT NULL DEFAULT 0,
                flagged_offensive    INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_thread
                ON messages(thread_id, created_at, id);

            -- Evidence: rows are never removed
            CREATE TRIGGER messages_no_delete
                BEFORE DELETE ON messages
            BEGIN
                SELECT RAISE(ABORT, 'messages are append-only');
            END;

            -- Evidence: content, authorship and moderation verdict are frozen
            CREATE TRIGGER messages_immutable
                BEFORE UPDATE OF id, thread_id, sender_id, sender_display_name, sender_role,
                                 kind, duration_secs, body, created_at, delivered_at,
                                 flagged_offensive
                ON messages
            BEGIN
                SELECT RAISE(ABORT, 'message content is immutable');
            END;

            -- read_at is set at most once
            CREATE TRIGGER messages_read_once
                BEFORE UPDATE OF read_at ON messages
                WHEN OLD.read_at IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'read_at already set');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Journal migrations complete");
    Ok(())
}
