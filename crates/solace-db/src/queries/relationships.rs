use anyhow::Result;

use super::users::read_user;
use crate::Database;
use crate::models::UserRow;

impl Database {
    pub fn create_relationship(
        &self,
        id: &str,
        therapist_id: &str,
        patient_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO therapist_patients (id, therapist_id, patient_id)
                 VALUES (?1, ?2, ?3)",
                (id, therapist_id, patient_id),
            )?;
            Ok(())
        })
    }

    pub fn relationship_exists(&self, therapist_id: &str, patient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM therapist_patients
                 WHERE therapist_id = ?1 AND patient_id = ?2",
                (therapist_id, patient_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Relationship in either role direction between two users.
    pub fn relationship_exists_either(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM therapist_patients
                 WHERE (therapist_id = ?1 AND patient_id = ?2)
                    OR (therapist_id = ?2 AND patient_id = ?1)",
                (a, b),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Hard delete. Returns false when no such row existed.
    pub fn delete_relationship(&self, therapist_id: &str, patient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM therapist_patients
                 WHERE therapist_id = ?1 AND patient_id = ?2",
                (therapist_id, patient_id),
            )?;
            Ok(deleted > 0)
        })
    }

    /// Patients under a therapist, most recently assigned first, each
    /// paired with the assignment timestamp.
    pub fn list_patients_of(&self, therapist_id: &str) -> Result<Vec<(UserRow, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.email, u.password, u.first_name, u.last_name, u.role,
                        u.created_at, tp.created_at
                 FROM users u
                 JOIN therapist_patients tp ON u.id = tp.patient_id
                 WHERE tp.therapist_id = ?1 AND u.role = 'patient'
                 ORDER BY tp.created_at DESC, tp.rowid DESC",
            )?;
            let rows = stmt
                .query_map([therapist_id], |row| {
                    Ok((read_user(row)?, row.get::<_, String>(7)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All patients minus those already assigned to this therapist.
    pub fn list_unassigned_patients(&self, therapist_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password, first_name, last_name, role, created_at
                 FROM users
                 WHERE role = 'patient'
                   AND id NOT IN (SELECT patient_id FROM therapist_patients
                                  WHERE therapist_id = ?1)
                 ORDER BY first_name, last_name",
            )?;
            let rows = stmt
                .query_map([therapist_id], read_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
