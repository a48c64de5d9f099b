use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "user_id, admin_email, spreadsheet_id, spreadsheet_url, config_json, \
                            created_at, last_accessed_at, is_active";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, admin_email, spreadsheet_id, spreadsheet_url, config_json,
                                    created_at, last_accessed_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.user_id,
                    user.admin_email.to_lowercase(),
                    user.spreadsheet_id,
                    user.spreadsheet_url,
                    user.config_json,
                    user.created_at,
                    user.last_accessed_at,
                    user.is_active,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "user_id", user_id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let email = email.trim().to_lowercase();
        self.with_conn(|conn| query_user(conn, "admin_email", &email))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no such user exists.
    pub fn update_config(&self, user_id: &str, config_json: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET config_json = ?2, last_accessed_at = ?3 WHERE user_id = ?1",
                (user_id, config_json, now),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_spreadsheet(
        &self,
        user_id: &str,
        spreadsheet_id: &str,
        spreadsheet_url: &str,
        config_json: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET spreadsheet_id = ?2, spreadsheet_url = ?3, config_json = ?4, last_accessed_at = ?5
                 WHERE user_id = ?1",
                (user_id, spreadsheet_id, spreadsheet_url, config_json, now),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn touch_user(&self, user_id: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_accessed_at = ?2 WHERE user_id = ?1",
                (user_id, now),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_user_active(&self, user_id: &str, active: bool, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2, last_accessed_at = ?3 WHERE user_id = ?1",
                rusqlite::params![user_id, active, now],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_user(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;
            Ok(changed > 0)
        })
    }

    // -- Properties --

    /// Reads a property unless it expired before `now` (unix seconds).
    pub fn get_property(&self, key: &str, now: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM properties
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![key, now],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn set_property(&self, key: &str, value: &str, expires_at: Option<i64>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO properties (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                rusqlite::params![key, value, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn delete_property(&self, key: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM properties WHERE key = ?1", [key])?;
            Ok(changed > 0)
        })
    }

    pub fn property_keys(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM properties
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key
                 LIMIT ?2",
            )?;
            let keys = stmt
                .query_map(rusqlite::params![prefix, limit as i64], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    /// Deletes every property that expired before `now`. Returns the count.
    pub fn purge_expired_properties(&self, now: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM properties WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now],
            )?;
            Ok(removed)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"
    ))?;

    stmt.query_row([value], map_user_row).optional()
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        admin_email: row.get(1)?,
        spreadsheet_id: row.get(2)?,
        spreadsheet_url: row.get(3)?,
        config_json: row.get(4)?,
        created_at: row.get(5)?,
        last_accessed_at: row.get(6)?,
        is_active: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> UserRow {
        UserRow {
            user_id: id.to_string(),
            admin_email: email.to_string(),
            spreadsheet_id: None,
            spreadsheet_url: None,
            config_json: "{}".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_accessed_at: "2026-01-01T00:00:00Z".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn email_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "Teacher@School.example")).unwrap();

        let found = db.get_user_by_email("  teacher@school.EXAMPLE ").unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(found.admin_email, "teacher@school.example");
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "a@x.com")).unwrap();
        assert!(db.create_user(&user("u2", "A@x.com")).is_err());
    }

    #[test]
    fn spreadsheet_update_and_soft_delete() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "a@x.com")).unwrap();

        assert!(db
            .update_spreadsheet("u1", "ss-1", "https://docs.example/d/ss-1/edit", "{\"v\":1}", "t1")
            .unwrap());
        assert!(db.set_user_active("u1", false, "t2").unwrap());

        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.spreadsheet_id.as_deref(), Some("ss-1"));
        assert_eq!(row.config_json, "{\"v\":1}");
        assert!(!row.is_active);
        assert_eq!(row.last_accessed_at, "t2");

        assert!(db.delete_user("u1").unwrap());
        assert!(db.get_user_by_id("u1").unwrap().is_none());
        assert!(!db.delete_user("u1").unwrap());
    }

    #[test]
    fn properties_respect_expiry() {
        let db = Database::open_in_memory().unwrap();
        db.set_property("a", "1", Some(100)).unwrap();
        db.set_property("b", "2", None).unwrap();

        assert_eq!(db.get_property("a", 50).unwrap().as_deref(), Some("1"));
        assert_eq!(db.get_property("a", 100).unwrap(), None);
        assert_eq!(db.get_property("b", i64::MAX).unwrap().as_deref(), Some("2"));

        assert_eq!(db.purge_expired_properties(150).unwrap(), 1);
        assert_eq!(db.property_keys("", 10).unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn property_prefix_is_literal() {
        let db = Database::open_in_memory().unwrap();
        db.set_property("hdr_ss1_Sheet1", "x", None).unwrap();
        db.set_property("hdr_ss10_Sheet1", "y", None).unwrap();
        db.set_property("hdrXss1", "z", None).unwrap();

        let keys = db.property_keys("hdr_ss1_", 10).unwrap();
        assert_eq!(keys, vec!["hdr_ss1_Sheet1".to_string()]);
    }
}
