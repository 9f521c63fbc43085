use anyhow::{Result, anyhow};
use rusqlite::types::ToSql;

use super::OptionalExt;
use crate::Database;
use crate::models::MoodEntryRow;
use solace_types::api::MoodEntryPatch;

const ENTRY_COLUMNS: &str = "id, user_id, mood_rating, notes, entry_date, created_at";

impl Database {
    pub fn insert_mood_entry(
        &self,
        id: &str,
        user_id: &str,
        mood_rating: i64,
        notes: Option<&str>,
        entry_date: &str,
    ) -> Result<MoodEntryRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mood_entries (id, user_id, mood_rating, notes, entry_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, mood_rating, notes, entry_date),
            )?;
            fetch_entry(conn, id)?.ok_or_else(|| anyhow!("mood entry vanished after insert"))
        })
    }

    pub fn list_mood_entries(
        &self,
        user_id: &str,
        range: Option<(&str, &str)>,
        limit: u32,
    ) -> Result<Vec<MoodEntryRow>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM mood_entries WHERE user_id = ?1");
            let mut params: Vec<&dyn ToSql> = vec![&user_id];

            if let Some((start, end)) = &range {
                sql.push_str(" AND entry_date BETWEEN ?2 AND ?3");
                params.push(start);
                params.push(end);
            }
            sql.push_str(" ORDER BY entry_date DESC, created_at DESC, rowid DESC LIMIT ?");
            sql.push_str(&(params.len() + 1).to_string());
            params.push(&limit);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), read_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a typed patch to an owned entry. Returns None when the entry
    /// does not exist or belongs to someone else.
    pub fn update_mood_entry(
        &self,
        id: &str,
        user_id: &str,
        patch: &MoodEntryPatch,
    ) -> Result<Option<MoodEntryRow>> {
        self.with_conn(|conn| {
            let owned: Option<String> = conn
                .query_row(
                    "SELECT id FROM mood_entries WHERE id = ?1 AND user_id = ?2",
                    (id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            if owned.is_none() {
                return Ok(None);
            }

            let entry_date = patch.entry_date.map(|d| d.to_string());
            let mut sets: Vec<&str> = Vec::new();
            let mut params: Vec<&dyn ToSql> = Vec::new();
            if let Some(rating) = &patch.mood_rating {
                sets.push("mood_rating = ?");
                params.push(rating);
            }
            if let Some(notes) = &patch.notes {
                sets.push("notes = ?");
                params.push(notes);
            }
            if let Some(date) = &entry_date {
                sets.push("entry_date = ?");
                params.push(date);
            }
            if sets.is_empty() {
                return fetch_entry(conn, id);
            }

            let sql = format!("UPDATE mood_entries SET {} WHERE id = ?", sets.join(", "));
            params.push(&id);
            conn.execute(&sql, params.as_slice())?;
            fetch_entry(conn, id)
        })
    }

    /// Hard delete. Returns false when not found or not owned.
    pub fn delete_mood_entry(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM mood_entries WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Read-time aggregation, nothing below is ever stored --

    pub fn mood_entry_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM mood_entries WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn last_mood_entry(&self, user_id: &str) -> Result<Option<MoodEntryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM mood_entries WHERE user_id = ?1
                 ORDER BY entry_date DESC, created_at DESC, rowid DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([user_id], read_entry).optional()
        })
    }

    /// Entries whose entry_date falls within the trailing week.
    pub fn recent_mood_entries(&self, user_id: &str) -> Result<Vec<MoodEntryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM mood_entries
                 WHERE user_id = ?1 AND entry_date >= date('now', '-7 days')
                 ORDER BY entry_date DESC, created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], read_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mood_average(&self, user_id: &str) -> Result<Option<f64>> {
        self.with_conn(|conn| {
            let avg = conn.query_row(
                "SELECT AVG(mood_rating) FROM mood_entries WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(avg)
        })
    }

    pub fn weekly_mood_average(&self, user_id: &str) -> Result<Option<f64>> {
        self.with_conn(|conn| {
            let avg = conn.query_row(
                "SELECT AVG(mood_rating) FROM mood_entries
                 WHERE user_id = ?1 AND entry_date >= date('now', '-7 days')",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(avg)
        })
    }
}

fn fetch_entry(conn: &rusqlite::Connection, id: &str) -> Result<Option<MoodEntryRow>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM mood_entries WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], read_entry).optional()
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MoodEntryRow> {
    Ok(MoodEntryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mood_rating: row.get(2)?,
        notes: row.get(3)?,
        entry_date: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn db_with_patient() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("p1", "p@example.com", "h", "Pat", "Moss", "patient")
            .unwrap();
        db
    }

    #[test]
    fn multiple_entries_per_day_are_allowed() {
        let db = db_with_patient();
        db.insert_mood_entry("m1", "p1", 4, None, "2026-08-01").unwrap();
        db.insert_mood_entry("m2", "p1", 7, Some("better"), "2026-08-01")
            .unwrap();
        assert_eq!(db.mood_entry_count("p1").unwrap(), 2);
    }

    #[test]
    fn schema_rejects_out_of_range_ratings() {
        let db = db_with_patient();
        assert!(db.insert_mood_entry("m1", "p1", 0, None, "2026-08-01").is_err());
        assert!(db.insert_mood_entry("m2", "p1", 11, None, "2026-08-01").is_err());
        assert!(db.insert_mood_entry("m3", "p1", 1, None, "2026-08-01").is_ok());
        assert!(db.insert_mood_entry("m4", "p1", 10, None, "2026-08-01").is_ok());
    }

    #[test]
    fn patch_touches_only_named_fields() {
        let db = db_with_patient();
        db.insert_mood_entry("m1", "p1", 4, Some("rough day"), "2026-08-01")
            .unwrap();

        let patch = MoodEntryPatch {
            mood_rating: Some(8),
            ..Default::default()
        };
        let updated = db.update_mood_entry("m1", "p1", &patch).unwrap().unwrap();
        assert_eq!(updated.mood_rating, 8);
        assert_eq!(updated.notes.as_deref(), Some("rough day"));
        assert_eq!(updated.entry_date, "2026-08-01");
    }

    #[test]
    fn updates_are_ownership_scoped() {
        let db = db_with_patient();
        db.create_user("p2", "p2@example.com", "h", "Ana", "Wren", "patient")
            .unwrap();
        db.insert_mood_entry("m1", "p1", 4, None, "2026-08-01").unwrap();

        let patch = MoodEntryPatch {
            mood_rating: Some(9),
            ..Default::default()
        };
        assert!(db.update_mood_entry("m1", "p2", &patch).unwrap().is_none());
        assert!(!db.delete_mood_entry("m1", "p2").unwrap());
        assert!(db.delete_mood_entry("m1", "p1").unwrap());
    }

    #[test]
    fn list_honors_range_and_limit() {
        let db = db_with_patient();
        db.insert_mood_entry("m1", "p1", 3, None, "2026-07-01").unwrap();
        db.insert_mood_entry("m2", "p1", 5, None, "2026-07-15").unwrap();
        db.insert_mood_entry("m3", "p1", 7, None, "2026-08-01").unwrap();

        let ranged = db
            .list_mood_entries("p1", Some(("2026-07-01", "2026-07-31")), 30)
            .unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[0].id, "m2");

        let limited = db.list_mood_entries("p1", None, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "m3");
    }
}
