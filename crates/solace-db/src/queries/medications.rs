use anyhow::{Result, anyhow};
use rusqlite::types::ToSql;

use super::OptionalExt;
use crate::Database;
use crate::models::MedicationRow;
use solace_types::api::MedicationPatch;

const MEDICATION_COLUMNS: &str =
    "id, user_id, name, dosage, frequency, time_to_take, notes, active, created_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_medication(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        dosage: Option<&str>,
        frequency: Option<&str>,
        time_to_take: &[String],
        notes: Option<&str>,
    ) -> Result<MedicationRow> {
        let times = serde_json::to_string(time_to_take)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO medications (id, user_id, name, dosage, frequency, time_to_take, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, user_id, name, dosage, frequency, &times, notes),
            )?;
            fetch_medication(conn, id)?.ok_or_else(|| anyhow!("medication vanished after insert"))
        })
    }

    pub fn list_medications(&self, user_id: &str, active: bool) -> Result<Vec<MedicationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEDICATION_COLUMNS} FROM medications
                 WHERE user_id = ?1 AND active = ?2
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_id, active), read_medication)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every active medication with at least one scheduled time, across
    /// all users. Feeds the reminder sweep.
    pub fn list_all_active_medications(&self) -> Result<Vec<MedicationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEDICATION_COLUMNS} FROM medications
                 WHERE active = 1 AND time_to_take != '[]'"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], read_medication)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a typed patch to an owned medication. Returns None when the
    /// medication does not exist or belongs to someone else.
    pub fn update_medication(
        &self,
        id: &str,
        user_id: &str,
        patch: &MedicationPatch,
    ) -> Result<Option<MedicationRow>> {
        let times = match &patch.time_to_take {
            Some(list) => Some(serde_json::to_string(list)?),
            None => None,
        };
        self.with_conn(|conn| {
            let owned: Option<String> = conn
                .query_row(
                    "SELECT id FROM medications WHERE id = ?1 AND user_id = ?2",
                    (id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            if owned.is_none() {
                return Ok(None);
            }

            let mut sets: Vec<&str> = Vec::new();
            let mut params: Vec<&dyn ToSql> = Vec::new();
            if let Some(name) = &patch.name {
                sets.push("name = ?");
                params.push(name);
            }
            if let Some(dosage) = &patch.dosage {
                sets.push("dosage = ?");
                params.push(dosage);
            }
            if let Some(frequency) = &patch.frequency {
                sets.push("frequency = ?");
                params.push(frequency);
            }
            if let Some(times) = &times {
                sets.push("time_to_take = ?");
                params.push(times);
            }
            if let Some(notes) = &patch.notes {
                sets.push("notes = ?");
                params.push(notes);
            }
            if let Some(active) = &patch.active {
                sets.push("active = ?");
                params.push(active);
            }
            if sets.is_empty() {
                return fetch_medication(conn, id);
            }

            let sql = format!("UPDATE medications SET {} WHERE id = ?", sets.join(", "));
            params.push(&id);
            conn.execute(&sql, params.as_slice())?;
            fetch_medication(conn, id)
        })
    }

    /// Soft delete: flips active to false, the row is retained.
    pub fn deactivate_medication(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE medications SET active = 0 WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn active_medication_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM medications WHERE user_id = ?1 AND active = 1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn fetch_medication(conn: &rusqlite::Connection, id: &str) -> Result<Option<MedicationRow>> {
    let sql = format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], read_medication).optional()
}

fn read_medication(row: &rusqlite::Row<'_>) -> rusqlite::Result<MedicationRow> {
    Ok(MedicationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        frequency: row.get(4)?,
        time_to_take: row.get(5)?,
        notes: row.get(6)?,
        active: row.get(7)?,
        created_at: row.get(8)?,
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
    fn times_round_trip_as_json() {
        let db = db_with_patient();
        let times = vec!["08:00".to_string(), "20:00".to_string()];
        let row = db
            .insert_medication("med1", "p1", "Sertraline", Some("50mg"), None, &times, None)
            .unwrap();
        assert_eq!(row.time_to_take, r#"["08:00","20:00"]"#);

        let med = row.into_medication();
        assert_eq!(med.time_to_take, times);
    }

    #[test]
    fn soft_delete_retains_the_row() {
        let db = db_with_patient();
        db.insert_medication("med1", "p1", "Sertraline", None, None, &[], None)
            .unwrap();

        assert!(db.deactivate_medication("med1", "p1").unwrap());
        assert_eq!(db.active_medication_count("p1").unwrap(), 0);

        // still listed among inactive medications
        let inactive = db.list_medications("p1", false).unwrap();
        assert_eq!(inactive.len(), 1);
        assert!(!inactive[0].active);

        // repeated delete of an already-inactive row is not an error
        assert!(!db.deactivate_medication("med2", "p1").unwrap());
    }

    #[test]
    fn patch_flips_active_and_replaces_times() {
        let db = db_with_patient();
        db.insert_medication(
            "med1",
            "p1",
            "Sertraline",
            Some("50mg"),
            Some("daily"),
            &["08:00".to_string()],
            None,
        )
        .unwrap();

        let patch = MedicationPatch {
            time_to_take: Some(vec!["09:30".to_string(), "21:30".to_string()]),
            active: Some(false),
            ..Default::default()
        };
        let updated = db.update_medication("med1", "p1", &patch).unwrap().unwrap();
        assert!(!updated.active);
        assert_eq!(updated.time_to_take, r#"["09:30","21:30"]"#);
        assert_eq!(updated.name, "Sertraline");
        assert_eq!(updated.dosage.as_deref(), Some("50mg"));
    }

    #[test]
    fn patch_is_ownership_scoped() {
        let db = db_with_patient();
        db.create_user("p2", "p2@example.com", "h", "Ana", "Wren", "patient")
            .unwrap();
        db.insert_medication("med1", "p1", "Sertraline", None, None, &[], None)
            .unwrap();

        let patch = MedicationPatch {
            name: Some("Other".to_string()),
            ..Default::default()
        };
        assert!(db.update_medication("med1", "p2", &patch).unwrap().is_none());
    }
}
