use anyhow::Result;

use super::OptionalExt;
use crate::Database;
use crate::models::NotificationRow;

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, title, content, created_at, read_at";

impl Database {
    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        kind: &str,
        title: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, type, title, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, kind, title, content),
            )?;
            Ok(())
        })
    }

    pub fn list_notifications(
        &self,
        user_id: &str,
        limit: u32,
        unread_only: bool,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ?1"
            );
            if unread_only {
                sql.push_str(" AND read_at IS NULL");
            }
            sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?2");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_id, limit), read_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One-way, idempotent read transition, scoped to the owner. Returns
    /// None when the notification is absent or owned by someone else;
    /// re-marking an already-read notification leaves read_at untouched.
    pub fn mark_notification_read(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let existing = fetch_notification(conn, id, user_id)?;
            let Some(row) = existing else {
                return Ok(None);
            };
            if row.read_at.is_some() {
                return Ok(Some(row));
            }
            conn.execute(
                "UPDATE notifications SET read_at = datetime('now')
                 WHERE id = ?1 AND user_id = ?2 AND read_at IS NULL",
                (id, user_id),
            )?;
            fetch_notification(conn, id, user_id)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read_at = datetime('now')
                 WHERE user_id = ?1 AND read_at IS NULL",
                [user_id],
            )?;
            Ok(updated)
        })
    }

    /// Hard delete, scoped to the owner. False when absent or not owned.
    pub fn delete_notification(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Same-calendar-day dedup for the reminder sweep: has a medication
    /// reminder naming this medication already been created today?
    pub fn medication_reminder_exists_today(
        &self,
        user_id: &str,
        medication_name: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", medication_name);
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE user_id = ?1
                   AND type = 'medication'
                   AND title LIKE ?2
                   AND date(created_at) = date('now')",
                (user_id, &pattern),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

fn fetch_notification(
    conn: &rusqlite::Connection,
    id: &str,
    user_id: &str,
) -> Result<Option<NotificationRow>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1 AND user_id = ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row((id, user_id), read_notification).optional()
}

fn read_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        read_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn db_with_user() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "u@example.com", "h", "Ann", "Lee", "patient")
            .unwrap();
        db.create_user("u2", "v@example.com", "h", "Bob", "Ray", "patient")
            .unwrap();
        db
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = db_with_user();
        db.insert_notification("n1", "u1", "message", "New message", "hello")
            .unwrap();

        let first = db.mark_notification_read("n1", "u1").unwrap().unwrap();
        let stamped = first.read_at.clone().unwrap();

        let second = db.mark_notification_read("n1", "u1").unwrap().unwrap();
        assert_eq!(second.read_at.as_deref(), Some(stamped.as_str()));
        assert_eq!(db.unread_notification_count("u1").unwrap(), 0);
    }

    #[test]
    fn operations_never_leak_other_users_rows() {
        let db = db_with_user();
        db.insert_notification("n1", "u1", "message", "New message", "hello")
            .unwrap();

        assert!(db.mark_notification_read("n1", "u2").unwrap().is_none());
        assert!(!db.delete_notification("n1", "u2").unwrap());
        // the owner still sees it unread
        assert_eq!(db.unread_notification_count("u1").unwrap(), 1);
    }

    #[test]
    fn unread_only_listing_filters_read_rows() {
        let db = db_with_user();
        db.insert_notification("n1", "u1", "message", "New message", "a")
            .unwrap();
        db.insert_notification("n2", "u1", "medication", "Medication reminder: X", "b")
            .unwrap();
        db.mark_notification_read("n1", "u1").unwrap();

        let unread = db.list_notifications("u1", 20, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "n2");

        let all = db.list_notifications("u1", 20, false).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn reminder_dedup_matches_title_and_day() {
        let db = db_with_user();
        assert!(!db.medication_reminder_exists_today("u1", "Sertraline").unwrap());

        db.insert_notification(
            "n1",
            "u1",
            "medication",
            "Medication reminder: Sertraline",
            "Time to take your medication",
        )
        .unwrap();

        assert!(db.medication_reminder_exists_today("u1", "Sertraline").unwrap());
        // different medication, same day
        assert!(!db.medication_reminder_exists_today("u1", "Lithium").unwrap());
        // same medication, different user
        assert!(!db.medication_reminder_exists_today("u2", "Sertraline").unwrap());
    }
}
