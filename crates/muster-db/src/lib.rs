pub mod error;
pub mod events;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod recipients;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Internal("connection lock poisoned".into()))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Internal("connection lock poisoned".into()))?;
        f(&mut conn)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use chrono::{Duration, Utc};
    use muster_types::api::{CreateEventRequest, CreateRecipientRequest};
    use uuid::Uuid;

    use super::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, email, "$argon2id$fake-hash", "", "", "")
            .unwrap();
        id
    }

    pub fn recipient_req(email: &str) -> CreateRecipientRequest {
        CreateRecipientRequest {
            email: email.to_string(),
            first_name: None,
            last_name: None,
            phone: None,
            company: None,
            position: None,
            tags: vec![],
            notes: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn recipient(db: &Database, user_id: Uuid, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_recipient(id, user_id, &recipient_req(email)).unwrap();
        id
    }

    pub fn event_req(title: &str) -> CreateEventRequest {
        CreateEventRequest {
            title: title.to_string(),
            description: None,
            event_date: Utc::now() + Duration::days(7),
            location: None,
            status: None,
            max_participants: None,
            is_public: false,
            registration_deadline: None,
            tags: vec![],
            metadata: serde_json::json!({}),
        }
    }
}
