//! Journal row types. These map directly to SQLite rows and stay
//! independent of the domain model; the store converts both ways.

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub sender_role: String,
    pub kind: String,
    pub duration_secs: Option<i64>,
    pub body: String,
    pub created_at: String,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
    pub legally_relevant: bool,
    pub flagged_offensive: bool,
}
