use crate::models::MessageRow;
use crate::Database;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str = "id, thread_id, sender_id, sender_display_name, sender_role, kind,
     duration_secs, body, created_at, delivered_at, read_at, legally_relevant, flagged_offensive";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    MESSAGE_COLUMNS
                ),
                rusqlite::params![
                    row.id,
                    row.thread_id,
                    row.sender_id,
                    row.sender_display_name,
                    row.sender_role,
                    row.kind,
                    row.duration_secs,
                    row.body,
                    row.created_at,
                    row.delivered_at,
                    row.read_at,
                    row.legally_relevant,
                    row.flagged_offensive,
                ],
            )?;
            Ok(())
        })
    }

    /// Stamp `read_at` on every listed message that has none yet.
    /// All-or-nothing. Returns the number of rows updated.
    pub fn mark_read(&self, reads: &[(i64, String)]) -> Result<usize> {
        if reads.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                )?;
                for (id, read_at) in reads {
                    updated += stmt.execute(rusqlite::params![read_at, id])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    pub fn set_legal_relevance(&self, id: i64, relevant: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET legally_relevant = ?1 WHERE id = ?2",
                rusqlite::params![relevant, id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Message not found in journal: {}", id));
            }
            Ok(())
        })
    }

    /// Every journaled message, in thread order.
    pub fn load_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(query_all_messages)
    }
}

fn query_all_messages(conn: &Connection) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages ORDER BY thread_id, created_at, id",
        MESSAGE_COLUMNS
    ))?;

    let rows = stmt
        .query_map([], map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_display_name: row.get(3)?,
        sender_role: row.get(4)?,
        kind: row.get(5)?,
        duration_secs: row.get(6)?,
        body: row.get(7)?,
        created_at: row.get(8)?,
        delivered_at: row.get(9)?,
        read_at: row.get(10)?,
        legally_relevant: row.get(11)?,
        flagged_offensive: row.get(12)?,
    })
}
