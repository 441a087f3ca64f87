// Inbox queries, always scoped to the recipient
use rusqlite::{params, Connection};

use super::Notification;

pub const INBOX_LIMIT: i64 = 100;

/// Newest first, at most [`INBOX_LIMIT`] rows.
pub fn list(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM notifications
         WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
        Notification::COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![user_id, unread_only, INBOX_LIMIT],
            Notification::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns false when the notification does not exist or belongs to someone else.
pub fn mark_read(conn: &Connection, user_id: &str, id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(updated > 0)
}

pub fn mark_all_read(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
    )
}

pub fn unread_count(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
        |row| row.get(0),
    )
}
