use anyhow::Result;

use super::OptionalExt;
use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str = "id, email, password, first_name, last_name, role, created_at";

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        role: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, email, password_hash, first_name, last_name, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([email], read_user).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([id], read_user).optional()
        })
    }

    pub fn list_users_by_role(&self, role: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE role = ?1
                 ORDER BY first_name, last_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([role], read_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(super) fn read_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
    })
}
