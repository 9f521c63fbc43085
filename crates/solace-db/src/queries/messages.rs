use std::collections::HashMap;

use anyhow::{Result, anyhow};

use super::OptionalExt;
use crate::Database;
use crate::models::{ConversationRow, MessageRow};

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, m.recipient_id, m.content, m.created_at,
        m.read_at, s.first_name, s.last_name, s.role
 FROM messages m
 JOIN users s ON s.id = m.sender_id";

impl Database {
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content)
                 VALUES (?1, ?2, ?3, ?4)",
                (id, sender_id, recipient_id, content),
            )?;
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([id], read_message)
                .optional()?
                .ok_or_else(|| anyhow!("message vanished after insert"))
        })
    }

    /// Messages between two users, newest first, paginated. The caller
    /// reverses the page for oldest-to-newest display.
    pub fn messages_between(
        &self,
        user_id: &str,
        other_user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                    OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_id, other_user_id, limit, offset), read_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip every unread message from `sender_id` to `recipient_id` to
    /// read. Already-read messages keep their original timestamp, so the
    /// transition is one-way and idempotent. Returns the number updated.
    pub fn mark_conversation_read(&self, recipient_id: &str, sender_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET read_at = datetime('now')
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND read_at IS NULL",
                (recipient_id, sender_id),
            )?;
            Ok(updated)
        })
    }

    pub fn unread_message_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND read_at IS NULL",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Derive one conversation row per counterpart: last message, its
    /// time, and the per-counterpart unread count. Most recently active
    /// conversation first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, recipient_id, content, created_at, read_at
                 FROM messages
                 WHERE sender_id = ?1 OR recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let scans = stmt
                .query_map([user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Fold newest-first: the first row seen for a counterpart is
            // that conversation's latest message.
            let mut order: Vec<String> = Vec::new();
            let mut summaries: HashMap<String, ConversationRow> = HashMap::new();
            for (sender_id, recipient_id, content, created_at, read_at) in scans {
                let other = if sender_id == user_id {
                    recipient_id
                } else {
                    sender_id.clone()
                };
                let summary = summaries.entry(other.clone()).or_insert_with(|| {
                    order.push(other.clone());
                    ConversationRow {
                        other_user_id: other.clone(),
                        first_name: String::new(),
                        last_name: String::new(),
                        role: String::new(),
                        last_message: content,
                        last_message_time: created_at,
                        unread_count: 0,
                    }
                });
                if sender_id != user_id && read_at.is_none() {
                    summary.unread_count += 1;
                }
            }

            if order.is_empty() {
                return Ok(vec![]);
            }

            // Batch-fetch counterpart names in one IN query.
            let placeholders: Vec<String> = (1..=order.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, first_name, last_name, role FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = order
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let users = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut names: HashMap<String, (String, String, String)> = HashMap::new();
            for (id, first_name, last_name, role) in users {
                names.insert(id, (first_name, last_name, role));
            }

            let rows = order
                .into_iter()
                .filter_map(|other| {
                    let mut summary = summaries.remove(&other)?;
                    let (first_name, last_name, role) = names
                        .remove(&other)
                        .unwrap_or_else(|| ("unknown".into(), String::new(), "patient".into()));
                    summary.first_name = first_name;
                    summary.last_name = last_name;
                    summary.role = role;
                    Some(summary)
                })
                .collect();
            Ok(rows)
        })
    }
}

fn read_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        read_at: row.get(5)?,
        sender_first_name: row.get(6)?,
        sender_last_name: row.get(7)?,
        sender_role: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn seed(db: &Database) {
        db.create_user("t1", "t@example.com", "h", "Tess", "Hart", "therapist")
            .unwrap();
        db.create_user("p1", "p1@example.com", "h", "Pat", "Moss", "patient")
            .unwrap();
        db.create_user("p2", "p2@example.com", "h", "Ana", "Wren", "patient")
            .unwrap();
    }

    #[test]
    fn insert_joins_sender_details() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let row = db.insert_message("m1", "p1", "t1", "Hi").unwrap();
        assert_eq!(row.sender_first_name, "Pat");
        assert_eq!(row.sender_role, "patient");
        assert!(row.read_at.is_none());
    }

    #[test]
    fn mark_read_is_one_way_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_message("m1", "p1", "t1", "Hi").unwrap();

        assert_eq!(db.unread_message_count("t1").unwrap(), 1);
        assert_eq!(db.mark_conversation_read("t1", "p1").unwrap(), 1);
        assert_eq!(db.unread_message_count("t1").unwrap(), 0);

        let read_at = db.messages_between("t1", "p1", 50, 0).unwrap()[0]
            .read_at
            .clone();
        assert!(read_at.is_some());

        // second call touches nothing
        assert_eq!(db.mark_conversation_read("t1", "p1").unwrap(), 0);
        let read_at_after = db.messages_between("t1", "p1", 50, 0).unwrap()[0]
            .read_at
            .clone();
        assert_eq!(read_at, read_at_after);
    }

    #[test]
    fn conversations_aggregate_per_counterpart() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_message("m1", "p1", "t1", "Hello").unwrap();
        db.insert_message("m2", "p1", "t1", "Are you there?").unwrap();
        db.insert_message("m3", "t1", "p1", "Yes, I am").unwrap();
        db.insert_message("m4", "p2", "t1", "New patient here").unwrap();

        let convs = db.list_conversations("t1").unwrap();
        assert_eq!(convs.len(), 2);

        // most recently active first
        assert_eq!(convs[0].other_user_id, "p2");
        assert_eq!(convs[0].last_message, "New patient here");
        assert_eq!(convs[0].unread_count, 1);

        assert_eq!(convs[1].other_user_id, "p1");
        assert_eq!(convs[1].last_message, "Yes, I am");
        assert_eq!(convs[1].first_name, "Pat");
        // only inbound unread messages count
        assert_eq!(convs[1].unread_count, 2);
    }

    #[test]
    fn pagination_walks_newest_first() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        for i in 0..5 {
            db.insert_message(&format!("m{i}"), "p1", "t1", &format!("msg {i}"))
                .unwrap();
        }

        let first_page = db.messages_between("t1", "p1", 2, 0).unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].content, "msg 4");

        let second_page = db.messages_between("t1", "p1", 2, 2).unwrap();
        assert_eq!(second_page[0].content, "msg 2");
    }
}
