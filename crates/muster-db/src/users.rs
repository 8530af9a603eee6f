use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{self, USER_COLS, UserRow};

impl Database {
    pub fn create_user(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        company_name: &str,
    ) -> StoreResult<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |r| r.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::DuplicateEmail);
            }

            let now = models::ts(Utc::now());
            tx.execute(
                "INSERT INTO users (id, email, password_hash, first_name, last_name, \
                 company_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    email,
                    password_hash,
                    first_name,
                    last_name,
                    company_name,
                    now
                ],
            )?;

            let row = tx.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                [id.to_string()],
                UserRow::from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
                    [email],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                    [id.to_string()],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Best-effort login stamp; callers may ignore the result.
    pub fn touch_last_login(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                params![models::ts(Utc::now()), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn update_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        company_name: &str,
    ) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET first_name = ?1, last_name = ?2, company_name = ?3, \
                 updated_at = ?4 WHERE id = ?5",
                params![
                    first_name,
                    last_name,
                    company_name,
                    models::ts(Utc::now()),
                    id.to_string()
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            let row = conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                [id.to_string()],
                UserRow::from_row,
            )?;
            Ok(row)
        })
    }

    pub fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, models::ts(Utc::now()), id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_user_active(&self, id: Uuid, active: bool) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, models::ts(Utc::now()), id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn create_and_fetch_user() {
        let db = test_util::db();
        let id = Uuid::new_v4();
        let row = db
            .create_user(id, "a@x.com", "hash", "Ada", "Lovelace", "Analytical")
            .unwrap();
        assert_eq!(row.email, "a@x.com");
        assert!(row.is_active);
        assert!(!row.email_verified);
        assert!(row.last_login_at.is_none());

        let by_email = db.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.first_name, "Ada");
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = test_util::db();
        db.create_user(Uuid::new_v4(), "a@x.com", "h", "", "", "").unwrap();
        let err = db
            .create_user(Uuid::new_v4(), "a@x.com", "h", "", "", "")
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[test]
    fn email_lookup_is_case_sensitive() {
        let db = test_util::db();
        db.create_user(Uuid::new_v4(), "a@x.com", "h", "", "", "").unwrap();
        assert!(db.get_user_by_email("A@x.com").unwrap().is_none());
    }

    #[test]
    fn deactivate_and_login_stamp() {
        let db = test_util::db();
        let id = test_util::user(&db, "a@x.com");

        db.touch_last_login(id).unwrap();
        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert!(row.last_login_at.is_some());

        db.set_user_active(id, false).unwrap();
        assert!(!db.get_user_by_id(id).unwrap().unwrap().is_active);
    }

    #[test]
    fn delete_missing_user_is_not_found() {
        let db = test_util::db();
        let err = db.delete_user(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
